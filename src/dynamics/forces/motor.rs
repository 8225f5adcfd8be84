//! Angular motor driving the relative spin of a body pair.

use crate::dynamics::forces::{Force, ForceKind};
use crate::dynamics::rigid_body::{RigidBodySet, RigidHandle};
use crate::math::{Matrix3, Real, Vector3};

/// Drives the per-step relative rotation towards `speed * dt`, with the
/// generalized force bounded by the torque limit stored in the row bounds.
#[derive(Clone, Debug)]
pub struct Motor {
    /// Target relative angular speed in radians per second.
    pub speed: Real,
}

impl Force {
    pub(crate) fn motor_constraint(&mut self, bodies: &RigidBodySet, dt: Real) {
        let ForceKind::Motor(motor) = &self.kind else {
            return;
        };
        let Some(b) = self.body(bodies, self.body_b) else {
            return;
        };

        // Relative angular travel accumulated so far this step.
        let d_angle_a = self
            .body(bodies, self.body_a)
            .map_or(0.0, |a| a.position.z - a.initial.z);
        let d_angle_b = b.position.z - b.initial.z;

        self.c[0] = (d_angle_a - d_angle_b) - motor.speed * dt;
    }

    pub(crate) fn motor_derivatives(&mut self, body: RigidHandle) {
        let direction = if Some(body) == self.body_a { 1.0 } else { -1.0 };
        self.j[0] = Vector3::new(0.0, 0.0, direction);
        self.h[0] = Matrix3::zeros();
    }
}
