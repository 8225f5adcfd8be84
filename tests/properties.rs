//! Invariants that must hold for any scene within the documented ranges.

use approx::assert_relative_eq;
use avbd2d::prelude::*;

fn add_box(
    solver: &mut Solver,
    size: (Real, Real),
    density: Real,
    position: (Real, Real, Real),
    velocity: (Real, Real, Real),
) -> RigidHandle {
    solver.add_body(
        Vector2::new(size.0, size.1),
        density,
        0.5,
        Vector3::new(position.0, position.1, position.2),
        Vector3::new(velocity.0, velocity.1, velocity.2),
    )
}

#[test]
fn isolated_body_preserves_momentum_without_gravity() {
    let mut solver = Solver::new();
    solver.params.gravity = 0.0;
    let body = add_box(&mut solver, (1.0, 1.0), 1.0, (0.0, 0.0, 0.0), (3.0, 2.0, 1.0));

    for _ in 0..10 {
        solver.step();
    }

    let velocity = solver.bodies[body].velocity;
    assert_relative_eq!(velocity, Vector3::new(3.0, 2.0, 1.0), epsilon = 1.0e-3);
}

/// Worst penetration over all touching pairs, from a fresh narrow-phase
/// query so it does not depend on cached contact state.
fn max_penetration(solver: &Solver) -> Real {
    let handles: Vec<RigidHandle> = solver.bodies.handles().collect();
    let mut deepest: Real = 0.0;

    for (i, &handle_a) in handles.iter().enumerate() {
        for &handle_b in &handles[i + 1..] {
            let body_a = &solver.bodies[handle_a];
            let body_b = &solver.bodies[handle_b];

            let mut contacts = [Contact::default(); 2];
            let count = collide(body_a, body_b, &mut contacts);
            for contact in &contacts[..count] {
                let world_a = avbd2d::math::transform(body_a.position, contact.r_a);
                let world_b = avbd2d::math::transform(body_b.position, contact.r_b);
                let separation = contact.normal.dot(&(world_a - world_b));
                deepest = deepest.max(-separation);
            }
        }
    }

    deepest
}

#[test]
fn stationary_stack_stays_within_contact_margin() {
    let mut solver = Solver::new();
    add_box(&mut solver, (100.0, 1.0), 0.0, (0.0, -0.5, 0.0), (0.0, 0.0, 0.0));
    add_box(&mut solver, (1.0, 1.0), 1.0, (0.0, 0.6, 0.0), (0.0, 0.0, 0.0));
    add_box(&mut solver, (1.0, 1.0), 1.0, (0.05, 1.7, 0.0), (0.0, 0.0, 0.0));
    add_box(&mut solver, (1.0, 1.0), 1.0, (-0.05, 2.8, 0.0), (0.0, 0.0, 0.0));

    for _ in 0..180 {
        solver.step();
    }

    // Once the stack is at rest, every contact holds its bodies apart up to
    // the collision margin.
    let deepest = max_penetration(&solver);
    assert!(
        deepest <= solver.params.collision_margin + 1.0e-3,
        "equilibrium overlap too deep: {deepest}"
    );
}

#[test]
fn contact_impulses_obey_newtons_third_law() {
    let mut solver = Solver::new();
    add_box(&mut solver, (100.0, 1.0), 0.0, (0.0, -0.5, 0.0), (0.0, 0.0, 0.0));
    add_box(&mut solver, (1.0, 1.0), 1.0, (0.0, 2.0, 0.0), (0.0, 0.0, 0.0));

    for _ in 0..120 {
        solver.step();
    }

    let mut checked = 0;
    for (_, force) in solver.forces.iter() {
        let ForceKind::Manifold(manifold) = &force.kind else {
            continue;
        };
        for (i, contact) in manifold.contacts[..manifold.num_contacts].iter().enumerate() {
            // The linear Jacobian blocks are exact negations by
            // construction, so the normal impulse applied to each body
            // cancels pairwise.
            assert_eq!(contact.j_an.xy(), -contact.j_bn.xy());
            assert_eq!(contact.j_at.xy(), -contact.j_bt.xy());

            let lambda_n = force.lambda[i * 2];
            let net = contact.j_an.xy() * lambda_n + contact.j_bn.xy() * lambda_n;
            assert_eq!(net, Vector2::zeros());

            // A settled contact carries a compressive normal impulse.
            assert!(lambda_n < 0.0, "normal multiplier not compressive");
            checked += 1;
        }
    }
    assert!(checked > 0, "no contacts to check");
}

#[test]
fn unloaded_constraint_state_decays_to_rest() {
    let mut solver = Solver::new();
    solver.params.gravity = 0.0;
    solver.params.post_stabilize = false;

    let a = add_box(&mut solver, (1.0, 1.0), 1.0, (0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
    let b = add_box(&mut solver, (1.0, 1.0), 1.0, (1.0, 0.0, 0.0), (0.0, 0.0, 0.0));
    let joint = solver.add_joint(
        Some(a),
        b,
        Vector2::new(0.5, 0.0),
        Vector2::new(-0.5, 0.0),
        Vector3::new(Real::INFINITY, Real::INFINITY, Real::INFINITY),
        Real::INFINITY,
    );

    // Plant a stale multiplier on the satisfied joint, as if a heavy load
    // had just been removed.
    solver.step();
    solver.forces.get_mut(joint).unwrap().lambda[0] = 50.0;

    let mut samples = Vec::new();
    for step in 0..1500 {
        solver.step();
        if step % 100 == 0 {
            samples.push(solver.forces[joint].lambda[0].abs());
        }
    }

    for window in samples.windows(2) {
        assert!(
            window[1] <= window[0] + 1.0e-4,
            "multiplier decay is not monotonic: {samples:?}"
        );
    }

    let force = &solver.forces[joint];
    assert!(force.lambda[0].abs() < 1.0e-3, "lambda = {}", force.lambda[0]);
    assert!(
        force.penalty[0] <= 1.5 * solver.params.penalty_min,
        "penalty stuck at {}",
        force.penalty[0]
    );
}

#[test]
fn warmstarted_contact_state_survives_frames() {
    let mut solver = Solver::new();
    add_box(&mut solver, (100.0, 1.0), 0.0, (0.0, -0.5, 0.0), (0.0, 0.0, 0.0));
    add_box(&mut solver, (1.0, 1.0), 1.0, (0.0, 0.51, 0.0), (0.0, 0.0, 0.0));

    for _ in 0..30 {
        solver.step();
    }

    // The penalty on the supporting contact rows must have ramped well past
    // its minimum, and stayed there thanks to the feature-id warmstart.
    let mut supported = false;
    for (_, force) in solver.forces.iter() {
        if let ForceKind::Manifold(manifold) = &force.kind {
            for i in 0..manifold.num_contacts {
                if force.penalty[i * 2] > 10.0 * solver.params.penalty_min
                    && force.lambda[i * 2] < 0.0
                {
                    supported = true;
                }
            }
        }
    }
    assert!(supported, "contact state was not carried across frames");
}
