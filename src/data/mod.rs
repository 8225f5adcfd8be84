//! Storage primitives shared by the dynamics structures.

pub mod arena;

pub use arena::{Arena, Index};
