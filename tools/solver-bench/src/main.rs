//! Headless benchmark driver: builds a preset scene, steps it, and prints a
//! JSON summary of timings and final-state statistics.

use std::env;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use avbd2d::prelude::*;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scene {
    Ground,
    Pyramid,
    Rope,
    Stack,
    Fracture,
}

impl Scene {
    fn as_str(self) -> &'static str {
        match self {
            Scene::Ground => "ground",
            Scene::Pyramid => "pyramid",
            Scene::Rope => "rope",
            Scene::Stack => "stack",
            Scene::Fracture => "fracture",
        }
    }

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "ground" => Ok(Scene::Ground),
            "pyramid" => Ok(Scene::Pyramid),
            "rope" => Ok(Scene::Rope),
            "stack" => Ok(Scene::Stack),
            "fracture" => Ok(Scene::Fracture),
            other => bail!("unsupported scene '{other}'"),
        }
    }
}

#[derive(Debug)]
struct Config {
    scene: Scene,
    steps: usize,
    size: usize,
    dt: Real,
    iterations: usize,
}

impl Config {
    fn from_args() -> Result<Self> {
        let mut scene = Scene::Pyramid;
        let mut steps: usize = 180;
        let mut size: usize = 20;
        let mut dt: Real = 1.0 / 60.0;
        let mut iterations: usize = 10;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--scene" => {
                    let value = args
                        .next()
                        .context("expected value after --scene (ground|pyramid|rope|stack|fracture)")?;
                    scene = Scene::from_str(&value)?;
                }
                "--steps" => {
                    let value = args.next().context("expected numeric value after --steps")?;
                    steps = value.parse().context("unable to parse --steps")?;
                }
                "--size" => {
                    let value = args.next().context("expected numeric value after --size")?;
                    size = value.parse().context("unable to parse --size")?;
                }
                "--dt" => {
                    let value = args.next().context("expected numeric value after --dt")?;
                    dt = value.parse().context("unable to parse --dt")?;
                }
                "--iterations" => {
                    let value = args
                        .next()
                        .context("expected numeric value after --iterations")?;
                    iterations = value.parse().context("unable to parse --iterations")?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => bail!("unknown argument '{other}'"),
            }
        }

        if steps == 0 {
            bail!("--steps must be greater than zero");
        }
        if size == 0 {
            bail!("--size must be greater than zero");
        }
        if dt <= 0.0 {
            bail!("--dt must be positive");
        }
        if iterations == 0 {
            bail!("--iterations must be greater than zero");
        }

        Ok(Config {
            scene,
            steps,
            size,
            dt,
            iterations,
        })
    }
}

#[derive(Serialize)]
struct BenchResult {
    scene: &'static str,
    steps: usize,
    size: usize,
    dt: Real,
    iterations: usize,
    total_ms: f64,
    average_ms: f64,
    body_count: usize,
    force_count: usize,
    contact_count: usize,
    max_speed: Real,
}

fn main() -> Result<()> {
    let config = Config::from_args()?;
    let result = run_benchmark(&config);
    let json = serde_json::to_string_pretty(&result)?;
    println!("{json}");
    Ok(())
}

fn run_benchmark(config: &Config) -> BenchResult {
    let mut solver = Solver::new();
    solver.params.dt = config.dt;
    solver.params.iterations = config.iterations;

    build_scene(&mut solver, config.scene, config.size);

    let start = Instant::now();
    for _ in 0..config.steps {
        solver.step();
    }
    let total_ms = start.elapsed().as_secs_f64() * 1.0e3;

    let contact_count = solver
        .forces
        .iter()
        .filter_map(|(_, force)| match &force.kind {
            ForceKind::Manifold(manifold) => Some(manifold.num_contacts),
            _ => None,
        })
        .sum();
    let max_speed = solver
        .bodies
        .iter()
        .map(|(_, body)| body.velocity.xy().norm())
        .fold(0.0, Real::max);

    BenchResult {
        scene: config.scene.as_str(),
        steps: config.steps,
        size: config.size,
        dt: config.dt,
        iterations: config.iterations,
        total_ms,
        average_ms: total_ms / config.steps as f64,
        body_count: solver.bodies.len(),
        force_count: solver.forces.len(),
        contact_count,
        max_speed,
    }
}

fn build_scene(solver: &mut Solver, scene: Scene, size: usize) {
    let ground = |solver: &mut Solver, y: Real| {
        solver.add_body(
            Vector2::new(100.0, 1.0),
            0.0,
            0.5,
            Vector3::new(0.0, y, 0.0),
            Vector3::zeros(),
        );
    };

    match scene {
        Scene::Ground => {
            ground(solver, -0.5);
            solver.add_body(
                Vector2::new(1.0, 1.0),
                1.0,
                0.5,
                Vector3::new(0.0, 5.0, 0.0),
                Vector3::zeros(),
            );
        }
        Scene::Pyramid => {
            ground(solver, -2.0);
            let n = size as i32;
            for y in 0..n {
                for x in 0..(n - y) {
                    solver.add_body(
                        Vector2::new(1.0, 0.5),
                        1.0,
                        0.5,
                        Vector3::new(
                            x as Real * 1.1 + y as Real * 0.5 - n as Real / 2.0,
                            y as Real * 0.85,
                            0.0,
                        ),
                        Vector3::zeros(),
                    );
                }
            }
        }
        Scene::Rope => {
            let mut prev: Option<RigidHandle> = None;
            for i in 0..size {
                let density = if i == 0 { 0.0 } else { 1.0 };
                let curr = solver.add_body(
                    Vector2::new(1.0, 0.5),
                    density,
                    0.5,
                    Vector3::new(i as Real, 10.0, 0.0),
                    Vector3::zeros(),
                );
                if let Some(prev) = prev {
                    solver.add_joint(
                        Some(prev),
                        curr,
                        Vector2::new(0.5, 0.0),
                        Vector2::new(-0.5, 0.0),
                        Vector3::new(Real::INFINITY, Real::INFINITY, 0.0),
                        Real::INFINITY,
                    );
                }
                prev = Some(curr);
            }
        }
        Scene::Stack => {
            ground(solver, 0.0);
            for i in 0..size {
                solver.add_body(
                    Vector2::new(1.0, 1.0),
                    1.0,
                    0.5,
                    Vector3::new(0.0, i as Real * 2.0 + 1.0, 0.0),
                    Vector3::zeros(),
                );
            }
        }
        Scene::Fracture => {
            ground(solver, 0.0);
            let n = size as i32;
            let mut prev: Option<RigidHandle> = None;
            for i in 0..=n {
                let curr = solver.add_body(
                    Vector2::new(1.0, 0.5),
                    1.0,
                    0.5,
                    Vector3::new(i as Real - n as Real / 2.0, 6.0, 0.0),
                    Vector3::zeros(),
                );
                if let Some(prev) = prev {
                    solver.add_joint(
                        Some(prev),
                        curr,
                        Vector2::new(0.5, 0.0),
                        Vector2::new(-0.5, 0.0),
                        Vector3::new(Real::INFINITY, Real::INFINITY, Real::INFINITY),
                        500.0,
                    );
                }
                prev = Some(curr);
            }
            for i in 0..15 {
                solver.add_body(
                    Vector2::new(2.0, 1.0),
                    1.0,
                    0.5,
                    Vector3::new(0.0, i as Real * 2.0 + 8.0, 0.0),
                    Vector3::zeros(),
                );
            }
        }
    }
}

fn print_usage() {
    eprintln!("solver-bench usage:");
    eprintln!(
        "  cargo run --package solver-bench -- [--scene ground|pyramid|rope|stack|fracture] \
         [--steps N] [--size N] [--dt seconds] [--iterations N]"
    );
    eprintln!("defaults: --scene pyramid --steps 180 --size 20 --dt 0.0166667 --iterations 10");
}
