//! Rigid bodies, constraints, and the stepping solver.

pub mod forces;
pub mod params;
pub mod rigid_body;
pub mod solver;

pub use forces::{Force, ForceHandle, ForceKind, ForceSet, Joint, Manifold, Motor, Spring, MAX_ROWS};
pub use params::SolverParams;
pub use rigid_body::{Rigid, RigidBodySet, RigidHandle};
pub use solver::{Solver, MAX_ANGULAR_VELOCITY};
