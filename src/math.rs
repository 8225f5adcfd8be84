//! Scalar and small fixed-size linear algebra used throughout the solver.
//!
//! Poses are packed as `Vector3` with `(x, y)` translation and `z` holding
//! the rotation angle, matching the generalized coordinate layout the solver
//! operates on. The only non-trivial routine is [`solve_ldlt`], which the
//! primal update relies on for its per-body 3×3 system.

/// The scalar type used by the simulation.
pub type Real = f32;

/// A 2D vector of [`Real`].
pub type Vector2 = nalgebra::Vector2<Real>;
/// A 3D vector of [`Real`]; also used as an (x, y, angle) pose.
pub type Vector3 = nalgebra::Vector3<Real>;
/// A 2×2 matrix of [`Real`].
pub type Matrix2 = nalgebra::Matrix2<Real>;
/// A 3×3 matrix of [`Real`].
pub type Matrix3 = nalgebra::Matrix3<Real>;

/// Sign of `x` with `sign(0) = 0`.
///
/// `f32::signum` maps `+0.0` to `1.0`, which is not what the warmstart
/// weighting wants when gravity is disabled.
pub fn sign(x: Real) -> Real {
    if x < 0.0 {
        -1.0
    } else if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// The scalar 2D cross product `a.x * b.y - a.y * b.x`.
pub fn cross(a: Vector2, b: Vector2) -> Real {
    a.x * b.y - a.y * b.x
}

/// Counter-clockwise rotation matrix for `angle` radians.
pub fn rotation(angle: Real) -> Matrix2 {
    let (s, c) = angle.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// Rotates `v` by `angle` radians.
pub fn rotate(angle: Real, v: Vector2) -> Vector2 {
    rotation(angle) * v
}

/// Maps the body-local point `v` into world space using the pose `q`.
pub fn transform(q: Vector3, v: Vector2) -> Vector2 {
    rotation(q.z) * v + q.xy()
}

/// Solves `a * x = b` for a symmetric positive-definite `a` via an LDLᵀ
/// factorization without pivoting.
///
/// The systems assembled by the primal update are `M/dt² + Σ κ·JJᵀ + |f|·G`
/// with a positive diagonal mass block and κ ≥ 1, so the pivots stay
/// strictly positive even when penalty parameters span the full
/// `[penalty_min, penalty_max]` range.
pub fn solve_ldlt(a: &Matrix3, b: &Vector3) -> Vector3 {
    // LDL^T decomposition.
    let d1 = a[(0, 0)];
    let l21 = a[(1, 0)] / d1;
    let l31 = a[(2, 0)] / d1;
    let d2 = a[(1, 1)] - l21 * l21 * d1;
    let l32 = (a[(2, 1)] - l21 * l31 * d1) / d2;
    let d3 = a[(2, 2)] - (l31 * l31 * d1 + l32 * l32 * d2);

    // Forward substitution: L y = b.
    let y1 = b.x;
    let y2 = b.y - l21 * y1;
    let y3 = b.z - l31 * y1 - l32 * y2;

    // Diagonal solve: D z = y.
    let z1 = y1 / d1;
    let z2 = y2 / d2;
    let z3 = y3 / d3;

    // Backward substitution: L^T x = z.
    let x2 = z3;
    let x1 = z2 - l32 * x2;
    let x0 = z1 - l21 * x1 - l31 * x2;

    Vector3::new(x0, x1, x2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ldlt_recovers_known_solution() {
        let a = Matrix3::new(4.0, 1.0, 0.5, 1.0, 3.0, 0.25, 0.5, 0.25, 2.0);
        let x = Vector3::new(1.0, -2.0, 3.0);
        let b = a * x;

        let solved = solve_ldlt(&a, &b);
        assert_relative_eq!(solved, x, epsilon = 1.0e-5);
    }

    #[test]
    fn ldlt_handles_penalty_scale_conditioning() {
        // Mass block plus a strongly weighted rank-1 penalty term, the worst
        // conditioning the dual update can produce.
        let j = Vector3::new(0.0, 1.0, 0.3);
        let kappa = 1.0e9;
        let m = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.1)) * 3600.0;
        let a = m + j * (j * kappa).transpose();

        let x = Vector3::new(0.25, -0.125, 0.5);
        let b = a * x;
        let solved = solve_ldlt(&a, &b);

        let residual = (a * solved - b).norm() / b.norm();
        assert!(residual < 1.0e-4, "relative residual too large: {residual}");
    }

    #[test]
    fn rotation_and_transform_agree() {
        let q = Vector3::new(1.0, 2.0, core::f32::consts::FRAC_PI_2);
        let p = transform(q, Vector2::new(1.0, 0.0));
        assert_relative_eq!(p, Vector2::new(1.0, 3.0), epsilon = 1.0e-6);

        let back = rotation(-q.z) * (p - q.xy());
        assert_relative_eq!(back, Vector2::new(1.0, 0.0), epsilon = 1.0e-6);
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(7.5), 1.0);
    }
}
