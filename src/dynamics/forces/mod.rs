//! The constraint (force) layer: a common row-based record plus the concrete
//! constraint variants the solver understands.
//!
//! Every force carries up to [`MAX_ROWS`] constraint rows. A row bundles a
//! Jacobian, a geometric-stiffness Hessian, the constraint value, a material
//! stiffness (`INFINITY` marks a hard row), signed force bounds, a fracture
//! threshold, and the persistent augmented-Lagrangian state: penalty
//! parameter and dual multiplier. The primal and dual updates only ever talk
//! to this row state; the variants differ in how they fill it.

mod joint;
mod manifold;
mod motor;
mod spring;

pub use joint::Joint;
pub use manifold::Manifold;
pub use motor::Motor;
pub use spring::Spring;

use crate::data::{Arena, Index};
use crate::dynamics::rigid_body::{Rigid, RigidBodySet, RigidHandle};
use crate::dynamics::SolverParams;
use crate::math::{Matrix3, Real, Vector2, Vector3};

/// Most rows an individual constraint can have.
pub const MAX_ROWS: usize = 4;

/// Handle of a force stored in a [`ForceSet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ForceHandle(pub(crate) Index);

/// The concrete behavior of a [`Force`].
#[derive(Clone, Debug)]
pub enum ForceKind {
    /// Revolute joint with positional and angular rows, optionally breakable.
    Joint(Joint),
    /// Distance spring with finite stiffness.
    Spring(Spring),
    /// Angular motor driving the relative spin of two bodies.
    Motor(Motor),
    /// Marker with no rows; suppresses contact generation for its pair.
    IgnoreCollision,
    /// Contact manifold holding up to two frictional contact points.
    Manifold(Manifold),
}

/// A constraint acting on up to two bodies.
///
/// `body_a` or `body_b` being `None` anchors that side to the world.
/// All row state is public so embedders and tests can inspect multipliers
/// and penalties directly.
#[derive(Clone, Debug)]
pub struct Force {
    /// First constrained body, or `None` for a world anchor.
    pub body_a: Option<RigidHandle>,
    /// Second constrained body, or `None` for a world anchor.
    pub body_b: Option<RigidHandle>,

    /// Jacobian row per body of interest (filled by `compute_derivatives`).
    pub j: [Vector3; MAX_ROWS],
    /// Hessian per row; only its column norms feed the geometric stiffness.
    pub h: [Matrix3; MAX_ROWS],
    /// Constraint values at the current positions.
    pub c: [Real; MAX_ROWS],
    /// Lower force bounds.
    pub fmin: [Real; MAX_ROWS],
    /// Upper force bounds.
    pub fmax: [Real; MAX_ROWS],
    /// Material stiffness; `INFINITY` marks a hard row.
    pub stiffness: [Real; MAX_ROWS],
    /// Disable the force once `|lambda|` reaches this per-row threshold.
    pub fracture: [Real; MAX_ROWS],
    /// Penalty parameters, warmstarted across steps.
    pub penalty: [Real; MAX_ROWS],
    /// Dual multipliers, warmstarted across steps.
    pub lambda: [Real; MAX_ROWS],

    /// Variant-specific state.
    pub kind: ForceKind,
}

impl Force {
    fn with_kind(body_a: Option<RigidHandle>, body_b: Option<RigidHandle>, kind: ForceKind) -> Self {
        Self {
            body_a,
            body_b,
            j: [Vector3::zeros(); MAX_ROWS],
            h: [Matrix3::zeros(); MAX_ROWS],
            c: [0.0; MAX_ROWS],
            fmin: [-Real::INFINITY; MAX_ROWS],
            fmax: [Real::INFINITY; MAX_ROWS],
            stiffness: [Real::INFINITY; MAX_ROWS],
            fracture: [Real::INFINITY; MAX_ROWS],
            penalty: [0.0; MAX_ROWS],
            lambda: [0.0; MAX_ROWS],
            kind,
        }
    }

    /// Creates a revolute joint pinning `r_a` on `body_a` (or the world
    /// point `r_a` if `body_a` is `None`) to `r_b` on `body_b`.
    ///
    /// `stiffness` sets the two positional rows and the angular row;
    /// `INFINITY` components are rigid. `fracture` bounds the angular
    /// multiplier and breaks the joint once reached.
    pub fn joint(
        bodies: &RigidBodySet,
        body_a: Option<RigidHandle>,
        body_b: RigidHandle,
        r_a: Vector2,
        r_b: Vector2,
        stiffness: Vector3,
        fracture: Real,
    ) -> Self {
        let angle_a = body_a.map_or(0.0, |handle| bodies[handle].position.z);
        let size_a = body_a.map_or(Vector2::zeros(), |handle| bodies[handle].size);
        let b = &bodies[body_b];

        let mut force = Self::with_kind(
            body_a,
            Some(body_b),
            ForceKind::Joint(Joint {
                r_a,
                r_b,
                c0: Vector3::zeros(),
                rest_angle: angle_a - b.position.z,
                torque_arm: (size_a + b.size).norm_squared(),
            }),
        );
        force.stiffness[0] = stiffness.x;
        force.stiffness[1] = stiffness.y;
        force.stiffness[2] = stiffness.z;
        force.fmax[2] = fracture;
        force.fmin[2] = -fracture;
        force.fracture[2] = fracture;
        force
    }

    /// Creates a distance spring between `r_a` on `body_a` and `r_b` on
    /// `body_b`. `rest: None` captures the current anchor distance.
    pub fn spring(
        bodies: &RigidBodySet,
        body_a: RigidHandle,
        body_b: RigidHandle,
        r_a: Vector2,
        r_b: Vector2,
        stiffness: Real,
        rest: Option<Real>,
    ) -> Self {
        let rest = rest.unwrap_or_else(|| {
            let a = &bodies[body_a];
            let b = &bodies[body_b];
            (crate::math::transform(a.position, r_a) - crate::math::transform(b.position, r_b))
                .norm()
        });

        let mut force = Self::with_kind(
            Some(body_a),
            Some(body_b),
            ForceKind::Spring(Spring { r_a, r_b, rest }),
        );
        force.stiffness[0] = stiffness;
        force
    }

    /// Creates a motor driving the relative angular speed of the pair
    /// towards `speed`, with torque limited to `max_torque`.
    pub fn motor(
        body_a: Option<RigidHandle>,
        body_b: RigidHandle,
        speed: Real,
        max_torque: Real,
    ) -> Self {
        let mut force = Self::with_kind(body_a, Some(body_b), ForceKind::Motor(Motor { speed }));
        force.fmax[0] = max_torque;
        force.fmin[0] = -max_torque;
        force
    }

    /// Creates the collision-suppression marker for a body pair.
    pub fn ignore_collision(body_a: RigidHandle, body_b: RigidHandle) -> Self {
        Self::with_kind(Some(body_a), Some(body_b), ForceKind::IgnoreCollision)
    }

    /// Creates an empty contact manifold for a body pair. The broadphase is
    /// the only caller; contacts appear during `initialize`.
    pub(crate) fn manifold(body_a: RigidHandle, body_b: RigidHandle) -> Self {
        let mut force = Self::with_kind(
            Some(body_a),
            Some(body_b),
            ForceKind::Manifold(Manifold::default()),
        );
        // Normal rows push only; friction row bounds are refreshed from the
        // normal multiplier every sweep.
        force.fmax[0] = 0.0;
        force.fmax[2] = 0.0;
        force
    }

    /// Number of active constraint rows.
    pub fn rows(&self) -> usize {
        match &self.kind {
            ForceKind::Joint(_) => 3,
            ForceKind::Spring(_) => 1,
            ForceKind::Motor(_) => 1,
            ForceKind::IgnoreCollision => 0,
            ForceKind::Manifold(manifold) => manifold.num_contacts * 2,
        }
    }

    /// Per-step initialization; caches whatever is constant over the step.
    ///
    /// Returns `false` to request removal from the solver (inactive joint,
    /// manifold that lost all its contacts).
    pub fn initialize(&mut self, bodies: &RigidBodySet, params: &SolverParams) -> bool {
        match self.kind {
            ForceKind::Joint(_) => self.joint_initialize(bodies),
            ForceKind::Spring(_) | ForceKind::Motor(_) | ForceKind::IgnoreCollision => true,
            ForceKind::Manifold(_) => self.manifold_initialize(bodies, params.collision_margin),
        }
    }

    /// Evaluates the constraint rows at the current body positions.
    ///
    /// `alpha` selects how much of the start-of-step error hard rows retain.
    pub fn compute_constraint(&mut self, bodies: &RigidBodySet, alpha: Real, params: &SolverParams) {
        match self.kind {
            ForceKind::Joint(_) => self.joint_constraint(bodies, alpha),
            ForceKind::Spring(_) => self.spring_constraint(bodies),
            ForceKind::Motor(_) => self.motor_constraint(bodies, params.dt),
            ForceKind::IgnoreCollision => {}
            ForceKind::Manifold(_) => self.manifold_constraint(bodies, alpha, params.stick_thresh),
        }
    }

    /// Fills the Jacobian and Hessian rows with respect to `body`, which
    /// must be one of the two endpoints.
    pub fn compute_derivatives(&mut self, bodies: &RigidBodySet, body: RigidHandle) {
        match self.kind {
            ForceKind::Joint(_) => self.joint_derivatives(bodies, body),
            ForceKind::Spring(_) => self.spring_derivatives(bodies, body),
            ForceKind::Motor(_) => self.motor_derivatives(body),
            ForceKind::IgnoreCollision => {}
            ForceKind::Manifold(_) => self.manifold_derivatives(body),
        }
    }

    /// Clears stiffness and augmented state on every row, neutralizing the
    /// force until `initialize` removes it at the next step boundary.
    pub fn disable(&mut self) {
        for i in 0..MAX_ROWS {
            self.stiffness[i] = 0.0;
            self.penalty[i] = 0.0;
            self.lambda[i] = 0.0;
        }
    }

    pub(crate) fn body<'a>(
        &self,
        bodies: &'a RigidBodySet,
        handle: Option<RigidHandle>,
    ) -> Option<&'a Rigid> {
        handle.and_then(|handle| bodies.get(handle))
    }
}

/// The set of forces owned by a solver.
#[derive(Default)]
pub struct ForceSet {
    arena: Arena<Force>,
}

impl ForceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of forces.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// `true` if the set holds no forces.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub(crate) fn insert(&mut self, force: Force) -> ForceHandle {
        ForceHandle(self.arena.insert(force))
    }

    pub(crate) fn remove(&mut self, handle: ForceHandle) -> Option<Force> {
        self.arena.remove(handle.0)
    }

    /// Returns the force at `handle`, if it is still live.
    pub fn get(&self, handle: ForceHandle) -> Option<&Force> {
        self.arena.get(handle.0)
    }

    /// Returns the force at `handle` mutably, if it is still live.
    pub fn get_mut(&mut self, handle: ForceHandle) -> Option<&mut Force> {
        self.arena.get_mut(handle.0)
    }

    /// Iterates over `(handle, &force)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ForceHandle, &Force)> {
        self.arena.iter().map(|(index, force)| (ForceHandle(index), force))
    }

    /// Iterates over `(handle, &mut force)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ForceHandle, &mut Force)> {
        self.arena
            .iter_mut()
            .map(|(index, force)| (ForceHandle(index), force))
    }

    /// Iterates over the live handles.
    pub fn handles(&self) -> impl Iterator<Item = ForceHandle> + '_ {
        self.arena.indices().map(ForceHandle)
    }

    /// Removes every force.
    pub fn clear(&mut self) {
        self.arena.clear();
    }
}

impl core::ops::Index<ForceHandle> for ForceSet {
    type Output = Force;

    fn index(&self, handle: ForceHandle) -> &Force {
        &self.arena[handle.0]
    }
}

impl core::ops::IndexMut<ForceHandle> for ForceSet {
    fn index_mut(&mut self, handle: ForceHandle) -> &mut Force {
        &mut self.arena[handle.0]
    }
}
