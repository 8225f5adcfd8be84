//! Revolute joint with positional and angular rows, with optional fracture.

use crate::dynamics::forces::{Force, ForceKind};
use crate::dynamics::rigid_body::{RigidBodySet, RigidHandle};
use crate::math::{rotate, transform, Real, Vector2, Vector3};

/// Pins an anchor on each body together and constrains their relative angle.
///
/// If the A side is world-anchored, `r_a` is interpreted as a world-space
/// point. The angular row is scaled by `torque_arm` so its units roughly
/// match the positional rows, which keeps the per-body 3×3 systems
/// well-conditioned.
#[derive(Clone, Debug)]
pub struct Joint {
    /// Anchor in body A's local frame (world point when A is the world).
    pub r_a: Vector2,
    /// Anchor in body B's local frame.
    pub r_b: Vector2,
    /// Constraint value at the start of the step.
    pub c0: Vector3,
    /// Scale applied to the angular row.
    pub torque_arm: Real,
    /// Relative angle captured at construction.
    pub rest_angle: Real,
}

impl Joint {
    /// World-space anchor points, A side first.
    pub fn anchors(
        &self,
        bodies: &RigidBodySet,
        body_a: Option<RigidHandle>,
        body_b: RigidHandle,
    ) -> (Vector2, Vector2) {
        let anchor_a = body_a
            .and_then(|handle| bodies.get(handle))
            .map_or(self.r_a, |a| transform(a.position, self.r_a));
        let anchor_b = bodies
            .get(body_b)
            .map_or(self.r_b, |b| transform(b.position, self.r_b));
        (anchor_a, anchor_b)
    }
}

fn joint_value(
    bodies: &RigidBodySet,
    body_a: Option<RigidHandle>,
    body_b: Option<RigidHandle>,
    joint: &Joint,
) -> Option<Vector3> {
    let body_b = bodies.get(body_b?)?;
    let body_a = body_a.and_then(|handle| bodies.get(handle));

    let anchor_a = body_a.map_or(joint.r_a, |a| transform(a.position, joint.r_a));
    let anchor_b = transform(body_b.position, joint.r_b);
    let angle_a = body_a.map_or(0.0, |a| a.position.z);

    let positional = anchor_a - anchor_b;
    let angular = (angle_a - body_b.position.z - joint.rest_angle) * joint.torque_arm;
    Some(Vector3::new(positional.x, positional.y, angular))
}

impl Force {
    pub(crate) fn joint_initialize(&mut self, bodies: &RigidBodySet) -> bool {
        let ForceKind::Joint(joint) = &self.kind else {
            return false;
        };
        // Capture C(x) at the beginning of the timestep for stabilization.
        let Some(c0) = joint_value(bodies, self.body_a, self.body_b, joint) else {
            return false;
        };
        if let ForceKind::Joint(joint) = &mut self.kind {
            joint.c0 = c0;
        }

        self.stiffness[0] != 0.0 || self.stiffness[1] != 0.0 || self.stiffness[2] != 0.0
    }

    pub(crate) fn joint_constraint(&mut self, bodies: &RigidBodySet, alpha: Real) {
        let ForceKind::Joint(joint) = &self.kind else {
            return;
        };
        let Some(cn) = joint_value(bodies, self.body_a, self.body_b, joint) else {
            return;
        };
        let c0 = joint.c0;

        for i in 0..3 {
            // Hard rows keep `alpha` of the start-of-step error (Eq. 18);
            // soft rows are plain compliant force laws.
            self.c[i] = if self.stiffness[i].is_infinite() {
                cn[i] - c0[i] * alpha
            } else {
                cn[i]
            };
        }
    }

    pub(crate) fn joint_derivatives(&mut self, bodies: &RigidBodySet, body: RigidHandle) {
        let ForceKind::Joint(joint) = &self.kind else {
            return;
        };
        let torque_arm = joint.torque_arm;

        if Some(body) == self.body_a {
            let Some(a) = self.body_a.and_then(|handle| bodies.get(handle)) else {
                return;
            };
            let r = rotate(a.position.z, joint.r_a);

            self.j[0] = Vector3::new(1.0, 0.0, -r.y);
            self.j[1] = Vector3::new(0.0, 1.0, r.x);
            self.j[2] = Vector3::new(0.0, 0.0, torque_arm);
            self.h[0].fill(0.0);
            self.h[0][(2, 2)] = -r.x;
            self.h[1].fill(0.0);
            self.h[1][(2, 2)] = -r.y;
            self.h[2].fill(0.0);
        } else {
            let Some(b) = self.body_b.and_then(|handle| bodies.get(handle)) else {
                return;
            };
            let r = rotate(b.position.z, joint.r_b);

            self.j[0] = Vector3::new(-1.0, 0.0, r.y);
            self.j[1] = Vector3::new(0.0, -1.0, -r.x);
            self.j[2] = Vector3::new(0.0, 0.0, -torque_arm);
            self.h[0].fill(0.0);
            self.h[0][(2, 2)] = r.x;
            self.h[1].fill(0.0);
            self.h[1][(2, 2)] = r.y;
            self.h[2].fill(0.0);
        }
    }
}
