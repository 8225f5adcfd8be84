//! Contact manifold: up to two frictional contact points between two boxes.

use crate::dynamics::forces::{Force, ForceKind};
use crate::dynamics::rigid_body::{RigidBodySet, RigidHandle};
use crate::geometry::{collide, Contact};
use crate::math::{cross, rotate, Matrix2, Real, Vector2, Vector3};

/// Persistent contact state for one body pair.
///
/// Rows come in (normal, tangent) pairs per contact: row `2i` is the
/// non-penetration row with compressive-only bounds, row `2i + 1` is the
/// friction row whose bounds follow `mu * |lambda_normal|`.
#[derive(Clone, Debug, Default)]
pub struct Manifold {
    /// Contact points found by the narrow phase this step.
    pub contacts: [Contact; 2],
    /// Number of live entries in `contacts`.
    pub num_contacts: usize,
    /// Combined friction coefficient of the pair.
    pub friction: Real,
}

impl Manifold {
    /// World positions of the live contact points on each body.
    pub fn contact_points(
        &self,
        bodies: &RigidBodySet,
        body_a: RigidHandle,
        body_b: RigidHandle,
    ) -> Vec<(Vector2, Vector2)> {
        let (Some(a), Some(b)) = (bodies.get(body_a), bodies.get(body_b)) else {
            return Vec::new();
        };
        self.contacts[..self.num_contacts]
            .iter()
            .map(|contact| {
                (
                    crate::math::transform(a.position, contact.r_a),
                    crate::math::transform(b.position, contact.r_b),
                )
            })
            .collect()
    }
}

impl Force {
    pub(crate) fn manifold_initialize(&mut self, bodies: &RigidBodySet, margin: Real) -> bool {
        let (Some(a), Some(b)) = (
            self.body(bodies, self.body_a),
            self.body(bodies, self.body_b),
        ) else {
            return false;
        };
        let old_penalty = self.penalty;
        let old_lambda = self.lambda;

        let ForceKind::Manifold(manifold) = &mut self.kind else {
            return false;
        };
        manifold.friction = (a.friction * b.friction).sqrt();

        // Snapshot the previous contact set before running the narrow phase,
        // so feature matching can carry the augmented state forward.
        let old_contacts = manifold.contacts;
        let old_num_contacts = manifold.num_contacts;

        manifold.num_contacts = collide(a, b, &mut manifold.contacts);

        // Merge old contact data into the new contacts by feature id.
        for i in 0..manifold.num_contacts {
            self.penalty[i * 2] = 0.0;
            self.penalty[i * 2 + 1] = 0.0;
            self.lambda[i * 2] = 0.0;
            self.lambda[i * 2 + 1] = 0.0;

            for j in 0..old_num_contacts {
                let old = &old_contacts[j];
                if manifold.contacts[i].feature != old.feature {
                    continue;
                }
                self.penalty[i * 2] = old_penalty[j * 2];
                self.penalty[i * 2 + 1] = old_penalty[j * 2 + 1];
                self.lambda[i * 2] = old_lambda[j * 2];
                self.lambda[i * 2 + 1] = old_lambda[j * 2 + 1];
                manifold.contacts[i].stick = old.stick;

                // A sticking contact keeps its old anchors, which is what
                // holds static-friction contacts in place across frames.
                if old.stick {
                    manifold.contacts[i].r_a = old.r_a;
                    manifold.contacts[i].r_b = old.r_b;
                }
            }
        }

        // Precompute the contact basis and Jacobians at the start-of-step
        // poses (Eq. 15); contacts use a truncated Taylor expansion, so these
        // stay fixed for the whole step. Second-order terms are dropped.
        for contact in &mut manifold.contacts[..manifold.num_contacts] {
            let normal = contact.normal;
            let tangent = Vector2::new(normal.y, -normal.x);
            let basis = Matrix2::new(normal.x, normal.y, tangent.x, tangent.y);

            let r_aw = rotate(a.position.z, contact.r_a);
            let r_bw = rotate(b.position.z, contact.r_b);

            contact.j_an = Vector3::new(normal.x, normal.y, cross(r_aw, normal));
            contact.j_bn = Vector3::new(-normal.x, -normal.y, -cross(r_bw, normal));
            contact.j_at = Vector3::new(tangent.x, tangent.y, cross(r_aw, tangent));
            contact.j_bt = Vector3::new(-tangent.x, -tangent.y, -cross(r_bw, tangent));

            contact.c0 = basis * (a.position.xy() + r_aw - b.position.xy() - r_bw)
                + Vector2::new(margin, 0.0);
        }

        manifold.num_contacts > 0
    }

    pub(crate) fn manifold_constraint(
        &mut self,
        bodies: &RigidBodySet,
        alpha: Real,
        stick_thresh: Real,
    ) {
        let (Some(a), Some(b)) = (
            self.body(bodies, self.body_a),
            self.body(bodies, self.body_b),
        ) else {
            return;
        };
        let dp_a = a.position - a.initial;
        let dp_b = b.position - b.initial;

        let ForceKind::Manifold(manifold) = &mut self.kind else {
            return;
        };
        for i in 0..manifold.num_contacts {
            let contact = &mut manifold.contacts[i];

            // First-order Taylor approximation of the constraint around the
            // start-of-step configuration.
            self.c[i * 2] =
                contact.c0.x * (1.0 - alpha) + contact.j_an.dot(&dp_a) + contact.j_bn.dot(&dp_b);
            self.c[i * 2 + 1] =
                contact.c0.y * (1.0 - alpha) + contact.j_at.dot(&dp_a) + contact.j_bt.dot(&dp_b);

            // Friction cone follows the latest normal multiplier.
            let friction_bound = self.lambda[i * 2].abs() * manifold.friction;
            self.fmax[i * 2 + 1] = friction_bound;
            self.fmin[i * 2 + 1] = -friction_bound;

            // Sticking contacts reuse their anchors next frame.
            contact.stick =
                self.lambda[i * 2 + 1].abs() < friction_bound && contact.c0.y.abs() < stick_thresh;
        }
    }

    pub(crate) fn manifold_derivatives(&mut self, body: RigidHandle) {
        let is_a = Some(body) == self.body_a;
        let ForceKind::Manifold(manifold) = &self.kind else {
            return;
        };
        for i in 0..manifold.num_contacts {
            let contact = &manifold.contacts[i];
            if is_a {
                self.j[i * 2] = contact.j_an;
                self.j[i * 2 + 1] = contact.j_at;
            } else {
                self.j[i * 2] = contact.j_bn;
                self.j[i * 2 + 1] = contact.j_bt;
            }
        }
    }
}
