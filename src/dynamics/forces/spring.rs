//! Distance spring between two body anchors.

use crate::dynamics::forces::{Force, ForceKind};
use crate::dynamics::rigid_body::{RigidBodySet, RigidHandle};
use crate::math::{rotate, transform, Matrix2, Matrix3, Real, Vector2, Vector3};

/// A compliant distance constraint `|anchor_a - anchor_b| - rest`.
#[derive(Clone, Debug)]
pub struct Spring {
    /// Anchor in body A's local frame.
    pub r_a: Vector2,
    /// Anchor in body B's local frame.
    pub r_b: Vector2,
    /// Rest length.
    pub rest: Real,
}

impl Spring {
    /// World-space anchor points, A side first.
    pub fn anchors(
        &self,
        bodies: &RigidBodySet,
        body_a: RigidHandle,
        body_b: RigidHandle,
    ) -> (Vector2, Vector2) {
        let anchor_a = bodies
            .get(body_a)
            .map_or(self.r_a, |a| transform(a.position, self.r_a));
        let anchor_b = bodies
            .get(body_b)
            .map_or(self.r_b, |b| transform(b.position, self.r_b));
        (anchor_a, anchor_b)
    }
}

fn perp(v: Vector2) -> Vector2 {
    Vector2::new(-v.y, v.x)
}

impl Force {
    pub(crate) fn spring_constraint(&mut self, bodies: &RigidBodySet) {
        let ForceKind::Spring(spring) = &self.kind else {
            return;
        };
        let (Some(a), Some(b)) = (
            self.body(bodies, self.body_a),
            self.body(bodies, self.body_b),
        ) else {
            return;
        };

        let d = transform(a.position, spring.r_a) - transform(b.position, spring.r_b);
        let rest = spring.rest;
        self.c[0] = d.norm() - rest;
    }

    pub(crate) fn spring_derivatives(&mut self, bodies: &RigidBodySet, body: RigidHandle) {
        let ForceKind::Spring(spring) = &self.kind else {
            return;
        };
        let (Some(a), Some(b)) = (
            self.body(bodies, self.body_a),
            self.body(bodies, self.body_b),
        ) else {
            return;
        };

        let d = transform(a.position, spring.r_a) - transform(b.position, spring.r_b);
        let dlen2 = d.norm_squared();
        if dlen2 == 0.0 {
            // Coincident anchors: no usable direction this iteration.
            self.j[0] = Vector3::zeros();
            self.h[0] = Matrix3::zeros();
            return;
        }
        let dlen = dlen2.sqrt();
        let n = d / dlen;
        let dxx = (Matrix2::identity() - n * n.transpose()) / dlen;

        let (sr, r, j_sign) = if Some(body) == self.body_a {
            (
                rotate(a.position.z, perp(spring.r_a)),
                rotate(a.position.z, spring.r_a),
                1.0,
            )
        } else {
            (
                rotate(b.position.z, perp(spring.r_b)),
                rotate(b.position.z, spring.r_b),
                -1.0,
            )
        };

        let dxr = dxx * (sr * j_sign);
        let drr = sr.dot(&dxr) - j_sign * n.dot(&r);

        self.j[0] = Vector3::new(j_sign * n.x, j_sign * n.y, j_sign * n.dot(&sr));
        self.h[0] = Matrix3::new(
            dxx[(0, 0)],
            dxx[(0, 1)],
            dxr.x,
            dxx[(1, 0)],
            dxx[(1, 1)],
            dxr.y,
            dxr.x,
            dxr.y,
            drr,
        );
    }
}
