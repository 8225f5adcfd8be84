//! Rigid-body state and the set container handed to the solver.

use crate::data::{Arena, Index};
use crate::dynamics::forces::{ForceHandle, ForceSet};
use crate::math::{rotation, Real, Vector2, Vector3};

/// Handle of a rigid body stored in a [`RigidBodySet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RigidHandle(pub(crate) Index);

/// State of one simulated rectangle.
///
/// The pose is `(x, y, angle)` packed in a `Vector3`. A body with
/// `mass <= 0` is static (or kinematic, if given a velocity): the solver
/// predicts it forward but never applies constraint corrections to it.
#[derive(Clone, Debug)]
pub struct Rigid {
    /// Current pose, mutated by every primal update.
    pub position: Vector3,
    /// Pose at the start of the current step.
    pub initial: Vector3,
    /// Unconstrained prediction for the current step.
    pub inertial: Vector3,
    /// Linear and angular velocity `(vx, vy, omega)`.
    pub velocity: Vector3,
    /// Velocity at the start of the previous step, for the adaptive warmstart.
    pub prev_velocity: Vector3,
    /// Full extents `(width, height)` of the rectangle in its local frame.
    pub size: Vector2,
    /// Mass; `0` marks the body as static.
    pub mass: Real,
    /// Rotational inertia about the center of mass.
    pub moment: Real,
    /// Friction coefficient, combined pairwise as `sqrt(mu_a * mu_b)`.
    pub friction: Real,
    /// Bounding-circle radius used by the broadphase.
    pub radius: Real,
    pub(crate) forces: Vec<ForceHandle>,
}

impl Rigid {
    /// Creates a body from its extents, density, friction, pose and velocity.
    ///
    /// A density of `0` produces a static body.
    pub fn new(
        size: Vector2,
        density: Real,
        friction: Real,
        position: Vector3,
        velocity: Vector3,
    ) -> Self {
        let mass = size.x * size.y * density;
        let moment = mass * size.dot(&size) / 12.0;
        let radius = (size * 0.5).norm();

        Self {
            position,
            initial: position,
            inertial: position,
            velocity,
            prev_velocity: velocity,
            size,
            mass,
            moment,
            friction,
            radius,
            forces: Vec::new(),
        }
    }

    /// `true` if the solver moves this body.
    pub fn is_dynamic(&self) -> bool {
        self.mass > 0.0
    }

    /// Handles of the forces currently acting on this body.
    pub fn forces(&self) -> &[ForceHandle] {
        &self.forces
    }

    /// `true` if any force in this body's list has `other` as its partner.
    ///
    /// The broadphase uses this to suppress contact manifolds between pairs
    /// that are already linked by a joint, a marker force, or an existing
    /// manifold.
    pub fn constrained_to(&self, forces: &ForceSet, other: RigidHandle) -> bool {
        self.forces.iter().any(|&handle| {
            forces.get(handle).is_some_and(|force| {
                force.body_a == Some(other) || force.body_b == Some(other)
            })
        })
    }

    /// World-space corners of the rectangle, counter-clockwise from the
    /// bottom-left. Renderers draw the body from these.
    pub fn corners(&self) -> [Vector2; 4] {
        let r = rotation(self.position.z);
        let h = self.size * 0.5;
        let p = self.position.xy();
        [
            r * Vector2::new(-h.x, -h.y) + p,
            r * Vector2::new(h.x, -h.y) + p,
            r * Vector2::new(h.x, h.y) + p,
            r * Vector2::new(-h.x, h.y) + p,
        ]
    }
}

/// The set of rigid bodies owned by a solver.
#[derive(Default)]
pub struct RigidBodySet {
    arena: Arena<Rigid>,
}

impl RigidBodySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// `true` if the set holds no bodies.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Inserts a body and returns its handle.
    pub fn insert(&mut self, body: Rigid) -> RigidHandle {
        RigidHandle(self.arena.insert(body))
    }

    /// Removes a body. The caller is responsible for removing its forces
    /// first; [`crate::dynamics::Solver::remove_body`] does both.
    pub(crate) fn remove(&mut self, handle: RigidHandle) -> Option<Rigid> {
        self.arena.remove(handle.0)
    }

    /// Returns the body at `handle`, if it is still live.
    pub fn get(&self, handle: RigidHandle) -> Option<&Rigid> {
        self.arena.get(handle.0)
    }

    /// Returns the body at `handle` mutably, if it is still live.
    pub fn get_mut(&mut self, handle: RigidHandle) -> Option<&mut Rigid> {
        self.arena.get_mut(handle.0)
    }

    /// Iterates over `(handle, &body)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (RigidHandle, &Rigid)> {
        self.arena.iter().map(|(index, body)| (RigidHandle(index), body))
    }

    /// Iterates over `(handle, &mut body)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RigidHandle, &mut Rigid)> {
        self.arena
            .iter_mut()
            .map(|(index, body)| (RigidHandle(index), body))
    }

    /// Iterates over the live handles.
    pub fn handles(&self) -> impl Iterator<Item = RigidHandle> + '_ {
        self.arena.indices().map(RigidHandle)
    }

    /// Removes every body.
    pub fn clear(&mut self) {
        self.arena.clear();
    }
}

impl core::ops::Index<RigidHandle> for RigidBodySet {
    type Output = Rigid;

    fn index(&self, handle: RigidHandle) -> &Rigid {
        &self.arena[handle.0]
    }
}

impl core::ops::IndexMut<RigidHandle> for RigidBodySet {
    fn index_mut(&mut self, handle: RigidHandle) -> &mut Rigid {
        &mut self.arena[handle.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mass_properties_follow_density_and_extents() {
        let body = Rigid::new(
            Vector2::new(2.0, 0.5),
            3.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );

        assert_relative_eq!(body.mass, 3.0);
        assert_relative_eq!(body.moment, 3.0 * (4.0 + 0.25) / 12.0);
        assert_relative_eq!(body.radius, (4.0f32 + 0.25).sqrt() * 0.5);
        assert!(body.is_dynamic());
    }

    #[test]
    fn zero_density_is_static() {
        let body = Rigid::new(
            Vector2::new(100.0, 1.0),
            0.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        assert!(!body.is_dynamic());
        assert_eq!(body.mass, 0.0);
        assert_eq!(body.moment, 0.0);
    }

    #[test]
    fn corners_rotate_with_the_pose() {
        let body = Rigid::new(
            Vector2::new(2.0, 1.0),
            1.0,
            0.5,
            Vector3::new(1.0, 1.0, core::f32::consts::FRAC_PI_2),
            Vector3::zeros(),
        );
        let corners = body.corners();
        // A quarter turn maps the bottom-right corner (1, -0.5) to (0.5, 1).
        assert_relative_eq!(corners[1], Vector2::new(1.5, 2.0), epsilon = 1.0e-6);
    }
}
