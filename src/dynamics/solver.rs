//! The AVBD solver: owns every body and force and advances the simulation.

use crate::dynamics::forces::{Force, ForceHandle, ForceSet};
use crate::dynamics::params::SolverParams;
use crate::dynamics::rigid_body::{Rigid, RigidBodySet, RigidHandle};
use crate::math::{self, rotation, sign, Matrix3, Real, Vector2, Vector3};

/// Hard clamp on angular velocity, in radians per second.
pub const MAX_ANGULAR_VELOCITY: Real = 50.0;

/// A 2D rigid-body world stepped with Augmented Vertex Block Descent.
///
/// Each [`step`](Self::step) performs: broadphase manifold creation, force
/// initialization and warmstart decay, inertial prediction with the adaptive
/// warmstart bias, the primal/dual iteration, BDF1 velocity recovery, and an
/// optional post-stabilization sweep.
#[derive(Default)]
pub struct Solver {
    /// Runtime configuration.
    pub params: SolverParams,
    /// All rigid bodies in the world.
    pub bodies: RigidBodySet,
    /// All forces in the world, contact manifolds included.
    pub forces: ForceSet,
}

impl Solver {
    /// Creates an empty world with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets all parameters to their defaults.
    pub fn default_params(&mut self) {
        self.params = SolverParams::default();
    }

    /// Removes every force, then every body.
    pub fn clear(&mut self) {
        self.forces.clear();
        for (_, body) in self.bodies.iter_mut() {
            body.forces.clear();
        }
        self.bodies.clear();
    }

    /// Adds a rectangle body. A `density` of `0` makes it static.
    pub fn add_body(
        &mut self,
        size: Vector2,
        density: Real,
        friction: Real,
        position: Vector3,
        velocity: Vector3,
    ) -> RigidHandle {
        self.bodies
            .insert(Rigid::new(size, density, friction, position, velocity))
    }

    /// Adds a revolute joint; see [`Force::joint`].
    pub fn add_joint(
        &mut self,
        body_a: Option<RigidHandle>,
        body_b: RigidHandle,
        r_a: Vector2,
        r_b: Vector2,
        stiffness: Vector3,
        fracture: Real,
    ) -> ForceHandle {
        let force = Force::joint(&self.bodies, body_a, body_b, r_a, r_b, stiffness, fracture);
        self.insert_force(force)
    }

    /// Adds a distance spring; see [`Force::spring`].
    pub fn add_spring(
        &mut self,
        body_a: RigidHandle,
        body_b: RigidHandle,
        r_a: Vector2,
        r_b: Vector2,
        stiffness: Real,
        rest: Option<Real>,
    ) -> ForceHandle {
        let force = Force::spring(&self.bodies, body_a, body_b, r_a, r_b, stiffness, rest);
        self.insert_force(force)
    }

    /// Adds an angular motor; see [`Force::motor`].
    pub fn add_motor(
        &mut self,
        body_a: Option<RigidHandle>,
        body_b: RigidHandle,
        speed: Real,
        max_torque: Real,
    ) -> ForceHandle {
        self.insert_force(Force::motor(body_a, body_b, speed, max_torque))
    }

    /// Suppresses contact generation between `body_a` and `body_b`.
    pub fn add_ignore_collision(
        &mut self,
        body_a: RigidHandle,
        body_b: RigidHandle,
    ) -> ForceHandle {
        self.insert_force(Force::ignore_collision(body_a, body_b))
    }

    fn insert_force(&mut self, force: Force) -> ForceHandle {
        let body_a = force.body_a;
        let body_b = force.body_b;
        let handle = self.forces.insert(force);

        for endpoint in [body_a, body_b].into_iter().flatten() {
            if let Some(body) = self.bodies.get_mut(endpoint) {
                body.forces.push(handle);
            }
        }
        handle
    }

    /// Removes a force, detaching it from both endpoint bodies.
    pub fn remove_force(&mut self, handle: ForceHandle) {
        let Some(force) = self.forces.remove(handle) else {
            return;
        };
        for endpoint in [force.body_a, force.body_b].into_iter().flatten() {
            if let Some(body) = self.bodies.get_mut(endpoint) {
                if let Some(position) = body.forces.iter().position(|&other| other == handle) {
                    body.forces.swap_remove(position);
                }
            }
        }
    }

    /// Removes a body together with every force referencing it.
    pub fn remove_body(&mut self, handle: RigidHandle) {
        let attached: Vec<ForceHandle> = self
            .bodies
            .get(handle)
            .map(|body| body.forces.clone())
            .unwrap_or_default();
        for force in attached {
            self.remove_force(force);
        }
        self.bodies.remove(handle);
    }

    /// Returns the first body whose rectangle contains the world point `at`,
    /// along with the point in that body's local frame.
    pub fn pick(&self, at: Vector2) -> Option<(RigidHandle, Vector2)> {
        for (handle, body) in self.bodies.iter() {
            let local = rotation(-body.position.z) * (at - body.position.xy());
            if local.x.abs() <= body.size.x * 0.5 && local.y.abs() <= body.size.y * 0.5 {
                return Some((handle, local));
            }
        }
        None
    }

    /// Advances the simulation by one timestep.
    pub fn step(&mut self) {
        tracing::trace!(
            bodies = self.bodies.len(),
            forces = self.forces.len(),
            dt = self.params.dt,
            "stepping"
        );

        self.broadphase();
        self.initialize_forces();
        self.predict_positions();

        // Main solver loop; post-stabilization appends one extra sweep that
        // either keeps all pre-existing error (during the regular sweeps) or
        // removes it entirely (in the final one).
        let iterations = self.params.iterations;
        let total_iterations = iterations + usize::from(self.params.post_stabilize);

        for it in 0..total_iterations {
            let alpha = if self.params.post_stabilize {
                if it < iterations {
                    1.0
                } else {
                    0.0
                }
            } else {
                self.params.alpha
            };

            self.primal_update(alpha);

            // The stabilization sweep sees no dual update, so the position
            // fix it applies never leaks into the warmstarted state.
            if it < iterations {
                self.dual_update(alpha);
            }

            // BDF1 velocity recovery happens before any stabilization sweep,
            // which therefore corrects position without adding energy.
            if it + 1 == iterations {
                self.update_velocities();
            }
        }
    }

    /// Naive O(n²) bounding-circle broadphase: spawn a contact manifold for
    /// every overlapping pair that is not already linked by a force.
    fn broadphase(&mut self) {
        let handles: Vec<RigidHandle> = self.bodies.handles().collect();
        let mut new_pairs = Vec::new();

        for (i, &handle_a) in handles.iter().enumerate() {
            for &handle_b in &handles[i + 1..] {
                let body_a = &self.bodies[handle_a];
                let body_b = &self.bodies[handle_b];

                let dp = body_a.position.xy() - body_b.position.xy();
                let reach = body_a.radius + body_b.radius;
                if dp.norm_squared() <= reach * reach
                    && !body_a.constrained_to(&self.forces, handle_b)
                {
                    new_pairs.push((handle_a, handle_b));
                }
            }
        }

        for (handle_a, handle_b) in new_pairs {
            let manifold = Force::manifold(handle_a, handle_b);
            self.insert_force(manifold);
        }
    }

    /// Initializes every force and applies the warmstart decay; forces that
    /// report themselves inactive are removed here.
    fn initialize_forces(&mut self) {
        let handles: Vec<ForceHandle> = self.forces.handles().collect();

        for handle in handles {
            let keep = match self.forces.get_mut(handle) {
                Some(force) => force.initialize(&self.bodies, &self.params),
                None => continue,
            };
            if !keep {
                self.remove_force(handle);
                continue;
            }

            let params = self.params;
            let Some(force) = self.forces.get_mut(handle) else {
                continue;
            };
            for i in 0..force.rows() {
                if params.post_stabilize {
                    // Post-stabilization lets us reuse the full multiplier
                    // from the previous step; only the penalty decays.
                    force.penalty[i] =
                        (force.penalty[i] * params.gamma).clamp(params.penalty_min, params.penalty_max);
                } else {
                    // Warmstart the dual variables and penalties (Eq. 19).
                    force.lambda[i] *= params.alpha * params.gamma;
                    force.penalty[i] =
                        (force.penalty[i] * params.gamma).clamp(params.penalty_min, params.penalty_max);
                }

                // Penalties never exceed the material stiffness of soft rows.
                force.penalty[i] = force.penalty[i].min(force.stiffness[i]);
            }
        }
    }

    /// Computes the inertial targets and the adaptively warmstarted starting
    /// positions for this step.
    fn predict_positions(&mut self) {
        let params = self.params;
        let dt = params.dt;
        let gravity = Vector3::new(0.0, params.gravity, 0.0);

        for (_, body) in self.bodies.iter_mut() {
            body.velocity.z = body
                .velocity
                .z
                .clamp(-MAX_ANGULAR_VELOCITY, MAX_ANGULAR_VELOCITY);

            // Inertial position (Eq. 2).
            body.inertial = body.position + body.velocity * dt;
            if body.mass > 0.0 {
                body.inertial += gravity * (dt * dt);
            }

            // Adaptive warmstart: bias the starting point towards the
            // gravity prediction by how much of last step's acceleration
            // was external.
            let accel = (body.velocity - body.prev_velocity) / dt;
            let accel_ext = accel.y * sign(params.gravity);
            let mut accel_weight = (accel_ext / params.gravity.abs()).clamp(0.0, 1.0);
            if !accel_weight.is_finite() {
                accel_weight = 0.0;
            }

            body.initial = body.position;
            body.position += body.velocity * dt + gravity * (accel_weight * dt * dt);
        }
    }

    /// One Gauss-Seidel sweep of per-body block descent: each dynamic body
    /// solves its local 3×3 system against all forces acting on it.
    fn primal_update(&mut self, alpha: Real) {
        let params = self.params;
        let dt2 = params.dt * params.dt;
        let handles: Vec<RigidHandle> = self.bodies.handles().collect();

        for body_handle in handles {
            let body = &self.bodies[body_handle];
            if body.mass <= 0.0 {
                continue;
            }

            // Left and right hand sides of the local system (Eqs. 5, 6).
            let mass_matrix =
                Matrix3::from_diagonal(&Vector3::new(body.mass, body.mass, body.moment));
            let mut lhs = mass_matrix / dt2;
            let mut rhs = (mass_matrix / dt2) * (body.position - body.inertial);

            let num_forces = body.forces.len();
            for k in 0..num_forces {
                let force_handle = self.bodies[body_handle].forces[k];
                let Some(force) = self.forces.get_mut(force_handle) else {
                    continue;
                };

                force.compute_constraint(&self.bodies, alpha, &params);
                force.compute_derivatives(&self.bodies, body_handle);

                for i in 0..force.rows() {
                    // Hard rows carry their multiplier; soft rows are pure
                    // penalty forces.
                    let lambda = if force.stiffness[i].is_infinite() {
                        force.lambda[i]
                    } else {
                        0.0
                    };

                    // Clamped force magnitude (Sec 3.2).
                    let f = (force.penalty[i] * force.c[i] + lambda)
                        .clamp(force.fmin[i], force.fmax[i]);

                    // Diagonally lumped geometric stiffness (Sec 3.5).
                    let g = Matrix3::from_diagonal(&Vector3::new(
                        force.h[i].column(0).norm(),
                        force.h[i].column(1).norm(),
                        force.h[i].column(2).norm(),
                    )) * f.abs();

                    // Accumulate force (Eq. 13) and hessian (Eq. 17).
                    rhs += force.j[i] * f;
                    lhs += force.j[i] * (force.j[i] * force.penalty[i]).transpose() + g;
                }
            }

            let delta = math::solve_ldlt(&lhs, &rhs);
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.position -= delta;
            }
        }
    }

    /// Advances the dual variables and ramps the penalty parameters.
    fn dual_update(&mut self, alpha: Real) {
        let Solver {
            params,
            bodies,
            forces,
        } = self;

        for (_, force) in forces.iter_mut() {
            force.compute_constraint(bodies, alpha, params);

            for i in 0..force.rows() {
                let lambda = if force.stiffness[i].is_infinite() {
                    force.lambda[i]
                } else {
                    0.0
                };

                // Multiplier update (Eq. 11). Non-conservative terms like
                // motor targets live in C itself, so nothing extra is added.
                force.lambda[i] =
                    (force.penalty[i] * force.c[i] + lambda).clamp(force.fmin[i], force.fmax[i]);

                if force.lambda[i].abs() >= force.fracture[i] {
                    tracing::debug!(row = i, lambda = force.lambda[i], "fracture threshold reached");
                    force.disable();
                }

                // Ramp the penalty while the multiplier is unsaturated
                // (Eq. 16), never past the material stiffness.
                if force.lambda[i] > force.fmin[i] && force.lambda[i] < force.fmax[i] {
                    force.penalty[i] = (force.penalty[i] + params.beta * force.c[i].abs())
                        .min(params.penalty_max.min(force.stiffness[i]));
                }
            }
        }
    }

    /// BDF1 velocity recovery.
    fn update_velocities(&mut self) {
        let dt = self.params.dt;
        for (_, body) in self.bodies.iter_mut() {
            body.prev_velocity = body.velocity;
            if body.mass > 0.0 {
                body.velocity = (body.position - body.initial) / dt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn free_fall_integrates_gravity() {
        let mut solver = Solver::new();
        let body = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::new(0.0, 10.0, 0.0),
            Vector3::zeros(),
        );

        let dt = solver.params.dt;
        let gravity = solver.params.gravity;
        solver.step();

        let b = &solver.bodies[body];
        // First step has a zero warmstart weight, so the position lands on
        // the inertial prediction and BDF1 recovers v = g * dt.
        assert_relative_eq!(b.position.y, 10.0 + gravity * dt * dt, epsilon = 1.0e-5);
        assert_relative_eq!(b.velocity.y, gravity * dt, epsilon = 1.0e-4);
    }

    #[test]
    fn static_body_never_moves() {
        let mut solver = Solver::new();
        let body = solver.add_body(
            Vector2::new(100.0, 1.0),
            0.0,
            0.5,
            Vector3::new(0.0, -0.5, 0.1),
            Vector3::zeros(),
        );

        for _ in 0..120 {
            solver.step();
        }

        let b = &solver.bodies[body];
        assert_eq!(b.position, Vector3::new(0.0, -0.5, 0.1));
        assert_eq!(b.velocity, Vector3::zeros());
    }

    #[test]
    fn angular_velocity_is_clamped() {
        let mut solver = Solver::new();
        solver.params.gravity = 0.0;
        let body = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, 1000.0),
        );

        solver.step();
        assert!(solver.bodies[body].velocity.z.abs() <= MAX_ANGULAR_VELOCITY + 1.0e-3);
    }

    #[test]
    fn jointed_pair_spawns_no_manifold() {
        let mut solver = Solver::new();
        let a = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let b = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::zeros(),
        );
        solver.add_joint(
            Some(a),
            b,
            Vector2::new(0.25, 0.0),
            Vector2::new(-0.25, 0.0),
            Vector3::new(Real::INFINITY, Real::INFINITY, Real::INFINITY),
            Real::INFINITY,
        );

        solver.step();

        let manifolds = solver
            .forces
            .iter()
            .filter(|(_, f)| matches!(f.kind, crate::dynamics::ForceKind::Manifold(_)))
            .count();
        assert_eq!(manifolds, 0);
    }

    #[test]
    fn ignore_collision_suppresses_contacts() {
        let mut solver = Solver::new();
        solver.params.gravity = 0.0;
        let a = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let b = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::zeros(),
        );
        let marker = solver.add_ignore_collision(a, b);

        for _ in 0..5 {
            solver.step();
        }

        let manifolds = solver
            .forces
            .iter()
            .filter(|(_, f)| matches!(f.kind, crate::dynamics::ForceKind::Manifold(_)))
            .count();
        assert_eq!(manifolds, 0);
        // The marker itself persists across steps.
        assert!(solver.forces.get(marker).is_some());
    }

    #[test]
    fn pick_respects_rotation() {
        let mut solver = Solver::new();
        let body = solver.add_body(
            Vector2::new(4.0, 1.0),
            1.0,
            0.5,
            Vector3::new(0.0, 0.0, core::f32::consts::FRAC_PI_2),
            Vector3::zeros(),
        );

        // The rectangle is now tall instead of wide.
        let hit = solver.pick(Vector2::new(0.0, 1.5));
        assert_eq!(hit.map(|(handle, _)| handle), Some(body));
        assert!(solver.pick(Vector2::new(1.5, 0.0)).is_none());

        let (_, local) = hit.unwrap();
        assert_relative_eq!(local, Vector2::new(1.5, 0.0), epsilon = 1.0e-5);
    }

    #[test]
    fn removing_a_body_detaches_its_forces() {
        let mut solver = Solver::new();
        let a = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let b = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::zeros(),
        );
        solver.add_spring(
            a,
            b,
            Vector2::zeros(),
            Vector2::zeros(),
            100.0,
            None,
        );

        solver.remove_body(a);
        assert_eq!(solver.forces.len(), 0);
        assert!(solver.bodies[b].forces().is_empty());
        assert_eq!(solver.bodies.len(), 1);
    }

    #[test]
    fn clear_empties_the_world() {
        let mut solver = Solver::new();
        let a = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let b = solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::zeros(),
        );
        solver.add_ignore_collision(a, b);
        solver.step();

        solver.clear();
        assert!(solver.bodies.is_empty());
        assert!(solver.forces.is_empty());

        // The world is reusable after clearing.
        solver.add_body(
            Vector2::new(1.0, 1.0),
            1.0,
            0.5,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        solver.step();
        assert_eq!(solver.bodies.len(), 1);
    }
}
