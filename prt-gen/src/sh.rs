//! Real spherical harmonic basis evaluation and basis-grid generation.

use std::f32::consts::PI;

use crate::plan::IntegrationPlan;

/// Evaluate all real SH basis functions up to degree `max_l` at a direction
/// given by `cos_theta` and `phi`. Returns `(max_l + 1)^2` values indexed by
/// `l*l + l + m` for `l` in `0..=max_l`, `m` in `-l..=l`.
///
/// The associated Legendre values are built by recurrence in increasing `l`
/// and, within each `l`, decreasing `m`, so every term only reads entries
/// already written. The normalization pass then runs `m` from `-l` to `l`,
/// reading the unnormalized `P(l, |m|)` before it is overwritten.
pub fn eval_sh(max_l: u32, cos_theta: f32, phi: f32) -> Vec<f32> {
    let max_l = max_l as i64;
    let n = ((max_l + 1) * (max_l + 1)) as usize;
    let mut sh = vec![0.0f32; n];

    for l in 0..=max_l {
        for m in (0..=l).rev() {
            let res = if l == m {
                legendre_diagonal(m, cos_theta)
            } else if l == m + 1 {
                let p1 = sh[(m * m + 2 * m) as usize];
                cos_theta * (2 * m + 1) as f32 * p1
            } else {
                let p1 = sh[(l * l - l + m) as usize];
                let p2 = sh[(l * l - 3 * l + m + 2) as usize];
                (cos_theta * (2 * l - 1) as f32 * p1 - (l + m - 1) as f32 * p2) / (l - m) as f32
            };
            sh[(l * l + l + m) as usize] = res;
        }
    }

    for l in 0..=max_l {
        for m in -l..=l {
            let p = sh[(l * l + l + m.abs()) as usize];
            sh[(l * l + l + m) as usize] = normalization(l, m, phi) * p;
        }
    }

    sh
}

// P(m, m) = (-1)^m (2m - 1)!! (1 - x^2)^(m/2)
fn legendre_diagonal(m: i64, x: f32) -> f32 {
    let sign = if m % 2 == 0 { 1.0f32 } else { -1.0f32 };
    sign * double_factorial((2 * m - 1) as f32) * (1.0 - x * x).powf(m as f32 / 2.0)
}

// K(l, m) with the azimuthal factor folded in: sqrt(2) cos(m phi) for m > 0,
// sqrt(2) sin(-m phi) for m < 0, 1 for m = 0.
fn normalization(l: i64, m: i64, phi: f32) -> f32 {
    let l_f = l as f32;
    let m_abs = m.abs() as f32;
    let mut res = ((2.0 * l_f + 1.0) * factorial(l_f - m_abs)
        / (4.0 * PI * factorial(l_f + m_abs)))
    .sqrt();
    if m < 0 {
        res *= std::f32::consts::SQRT_2 * (-(m as f32) * phi).sin();
    } else if m > 0 {
        res *= std::f32::consts::SQRT_2 * (m as f32 * phi).cos();
    }
    res
}

/// Factorial with floating accumulation; the double factorials that feed the
/// normalization constants overflow integers well before `f32` loses them.
pub fn factorial(n: f32) -> f32 {
    let mut acc = 1.0f32;
    let mut k = n;
    while k > 1.0 {
        acc *= k;
        k -= 1.0;
    }
    acc
}

pub fn double_factorial(n: f32) -> f32 {
    let mut acc = 1.0f32;
    let mut k = n;
    while k > 1.0 {
        acc *= k;
        k -= 2.0;
    }
    acc
}

/// Generate one scalar grid per basis function, sampled over the full sphere:
/// theta spans [0, pi] along the grid x axis and phi spans [0, 2*pi] along the
/// grid y axis, both endpoints included. Each grid is uploaded as one
/// `R32Float` texture and sampled by the integration shaders.
pub fn basis_grids(plan: &IntegrationPlan) -> Vec<Vec<f32>> {
    let grid = plan.sh_grid_rounded as usize;
    let n = plan.n_coefficients as usize;
    let mut grids: Vec<Vec<f32>> = (0..n).map(|_| Vec::with_capacity(grid * grid)).collect();
    for iy in 0..grid {
        let phi = 2.0 * PI * iy as f32 / (grid - 1) as f32;
        for ix in 0..grid {
            let theta = PI * ix as f32 / (grid - 1) as f32;
            let sh = eval_sh(plan.max_l, theta.cos(), phi);
            for (k, g) in grids.iter_mut().enumerate() {
                g.push(sh[k]);
            }
        }
    }
    grids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::compute_plan;

    const Y00: f32 = 0.282_094_79; // 1 / (2 sqrt(pi))

    #[test]
    fn degree_zero_is_constant() {
        for &(ct, phi) in &[(1.0f32, 0.0f32), (-0.3, 1.7), (0.5, 4.0), (0.0, 6.0)] {
            let sh = eval_sh(0, ct, phi);
            assert_eq!(sh.len(), 1);
            assert!((sh[0] - Y00).abs() < 1e-6);
        }
    }

    #[test]
    fn coefficient_count() {
        for max_l in 0..6u32 {
            let sh = eval_sh(max_l, 0.3, 1.2);
            assert_eq!(sh.len(), ((max_l + 1) * (max_l + 1)) as usize);
        }
    }

    #[test]
    fn degree_one_matches_closed_form() {
        // Y(1,0) = sqrt(3/4pi) cos(theta)
        let k10 = (3.0 / (4.0 * PI)).sqrt();
        let sh = eval_sh(1, 0.6, 0.9);
        assert!((sh[2] - k10 * 0.6).abs() < 1e-5);

        // Y(1,1) = -sqrt(3/4pi) sin(theta) cos(phi) with the Condon-Shortley
        // sign carried by the diagonal recurrence.
        let theta = std::f32::consts::FRAC_PI_2;
        let sh = eval_sh(1, theta.cos(), 0.0);
        assert!((sh[3] + k10).abs() < 1e-5);
    }

    #[test]
    fn grid_orthonormality() {
        // Riemann sum of Y_i * Y_j * sin(theta) over the same endpoint-
        // inclusive grid the GPU consumes; coarse, so a loose tolerance.
        let grid = 128usize;
        let max_l = 2u32;
        let n = ((max_l + 1) * (max_l + 1)) as usize;
        let d_theta = PI / (grid - 1) as f32;
        let d_phi = 2.0 * PI / (grid - 1) as f32;

        let mut integrals = vec![0.0f64; n * n];
        for iy in 0..grid {
            let phi = 2.0 * PI * iy as f32 / (grid - 1) as f32;
            for ix in 0..grid {
                let theta = PI * ix as f32 / (grid - 1) as f32;
                let sh = eval_sh(max_l, theta.cos(), phi);
                let w = (theta.sin() * d_theta * d_phi) as f64;
                for i in 0..n {
                    for j in 0..n {
                        integrals[i * n + j] += sh[i] as f64 * sh[j] as f64 * w;
                    }
                }
            }
        }
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (integrals[i * n + j] - expected).abs() < 0.05,
                    "pair ({}, {}) integrated to {}",
                    i,
                    j,
                    integrals[i * n + j]
                );
            }
        }
    }

    #[test]
    fn factorials_accumulate_in_float() {
        assert_eq!(factorial(0.0), 1.0);
        assert_eq!(factorial(5.0), 120.0);
        assert_eq!(double_factorial(-1.0), 1.0);
        assert_eq!(double_factorial(7.0), 105.0);
        // 33!! for max_l = 17 exceeds u64; float accumulation carries it.
        assert!(double_factorial(33.0).is_finite());
    }

    #[test]
    fn grid_shape_matches_plan() {
        let plan = compute_plan(2, 64, 10);
        let grids = basis_grids(&plan);
        assert_eq!(grids.len(), 9);
        let cells = (plan.sh_grid_rounded * plan.sh_grid_rounded) as usize;
        assert!(grids.iter().all(|g| g.len() == cells));
        // theta = 0 column of Y00 is the constant band.
        assert!((grids[0][0] - Y00).abs() < 1e-6);
    }
}
