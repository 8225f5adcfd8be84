//! Narrow-phase collision geometry.

pub mod box_box;

pub use box_box::{collide, Contact, FeaturePair};
