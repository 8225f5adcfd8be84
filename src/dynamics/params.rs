//! Runtime configuration of the solver.

use crate::math::Real;

/// Tunable parameters and numeric policy constants of the solver.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SolverParams {
    /// Timestep in seconds. Valid range `(0, 0.1]`.
    pub dt: Real,
    /// Gravity along the world y axis.
    pub gravity: Real,
    /// Number of primal/dual sweeps per step. Must be at least 1.
    pub iterations: usize,

    /// Stabilization retention in `[0, 1]`: 1 keeps all pre-existing
    /// constraint error, 0 removes it in a single step. Higher values give
    /// slower, smoother error correction; lower values are more energetic.
    pub alpha: Real,
    /// Penalty ramp rate per dual sweep. The useful range depends on the
    /// length, mass and constraint scales of the scene; values far outside
    /// `[1, 1e6]` slow convergence on complex scenes.
    pub beta: Real,
    /// Per-step decay of the warmstarted penalty and multiplier state.
    /// Must stay below 1 so penalties can shrink again.
    pub gamma: Real,

    /// Runs one extra primal-only sweep with full error removal after the
    /// main loop, which fixes residual positional error without disturbing
    /// velocities and removes the need to tune `alpha`.
    pub post_stabilize: bool,

    /// Lower clamp of the penalty parameters.
    pub penalty_min: Real,
    /// Upper clamp of the penalty parameters.
    pub penalty_max: Real,
    /// Extra separation targeted by contacts, to avoid flickering.
    pub collision_margin: Real,
    /// Tangential drift below which a contact counts as sticking.
    pub stick_thresh: Real,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            gravity: -10.0,
            iterations: 10,
            alpha: 0.99,
            beta: 100_000.0,
            gamma: 0.99,
            post_stabilize: true,
            penalty_min: 1.0,
            penalty_max: 1.0e9,
            collision_margin: 0.0005,
            stick_thresh: 0.01,
        }
    }
}
