//! 2D rigid-body physics based on Augmented Vertex Block Descent (AVBD).
//!
//! The solver unifies hard equality constraints, compliant springs,
//! inelastic contact with friction, angular motors, and breakable joints in
//! a single primal-dual position-level iteration, following the formulation
//! of the SIGGRAPH 2025 AVBD paper. Bodies are oriented rectangles; contacts
//! come from a face-clipping narrow phase with persistent feature ids that
//! feed the impulse warmstart.
//!
//! The crate is headless: no rendering, windowing or input. Embedders drive
//! it through [`dynamics::Solver`] and read whatever they need back out of
//! the public body and force sets.
//!
//! ```
//! use avbd2d::prelude::*;
//!
//! let mut solver = Solver::new();
//! let ground = solver.add_body(
//!     Vector2::new(100.0, 1.0),
//!     0.0,
//!     0.5,
//!     Vector3::new(0.0, -0.5, 0.0),
//!     Vector3::zeros(),
//! );
//! let cube = solver.add_body(
//!     Vector2::new(1.0, 1.0),
//!     1.0,
//!     0.5,
//!     Vector3::new(0.0, 5.0, 0.0),
//!     Vector3::zeros(),
//! );
//!
//! for _ in 0..120 {
//!     solver.step();
//! }
//!
//! assert!(solver.bodies[cube].position.y > solver.bodies[ground].position.y);
//! ```

pub mod data;
pub mod dynamics;
pub mod geometry;
pub mod math;

/// Convenience re-exports of the public surface.
pub mod prelude {
    pub use crate::dynamics::{
        Force, ForceHandle, ForceKind, ForceSet, Joint, Manifold, Motor, Rigid, RigidBodySet,
        RigidHandle, Solver, SolverParams, Spring, MAX_ANGULAR_VELOCITY, MAX_ROWS,
    };
    pub use crate::geometry::{collide, Contact, FeaturePair};
    pub use crate::math::{Matrix2, Matrix3, Real, Vector2, Vector3};
}
