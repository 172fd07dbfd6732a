//! Dense 3×3 kernels.
//!
//! The solver's Schur complement is block tridiagonal with 3×3 blocks, and
//! its Cholesky factor is block bidiagonal; everything here operates on one
//! such block. Matrices are row-major `[Float; 9]`.

use crate::Float;

pub type Mat3 = [Float; 9];
pub type Vec3 = [Float; 3];

/// Non-positive pivot encountered while factorizing a block.
///
/// The blocks fed to [`cholesky`] are positive definite whenever all
/// objective gains are strictly positive, so this surfaces a configuration
/// or arithmetic fault rather than an expected condition.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("non-positive pivot {value:.6e} at row {row} of a 3x3 Cholesky block")]
pub struct NonPositivePivot {
    pub row: usize,
    pub value: Float,
}

/// In-place lower Cholesky of a symmetric block.
///
/// Only the lower triangle of `m` is read; on success the lower triangle
/// holds `L` with `L·Lᵀ = M` and the strict upper triangle is zeroed.
pub fn cholesky(m: &mut Mat3) -> Result<(), NonPositivePivot> {
    // Column-by-column, subtracting the dot of the already computed part of
    // the row before taking the pivot root.
    for j in 0..3 {
        let mut pivot = m[4 * j];
        for k in 0..j {
            pivot -= m[3 * j + k] * m[3 * j + k];
        }
        if pivot <= 0.0 {
            return Err(NonPositivePivot { row: j, value: pivot });
        }
        let pivot = pivot.sqrt();
        m[4 * j] = pivot;
        for i in (j + 1)..3 {
            let mut v = m[3 * i + j];
            for k in 0..j {
                v -= m[3 * i + k] * m[3 * j + k];
            }
            m[3 * i + j] = v / pivot;
        }
        m[3 * j + (j + 1)..3 * j + 3].fill(0.0);
    }
    Ok(())
}

/// Solve `L·y = v` in place for a lower-triangular `l`.
#[inline]
pub fn solve_lower(l: &Mat3, v: &mut [Float]) {
    debug_assert!(v.len() >= 3);
    v[0] /= l[0];
    v[1] = (v[1] - l[3] * v[0]) / l[4];
    v[2] = (v[2] - l[6] * v[0] - l[7] * v[1]) / l[8];
}

/// Solve `Lᵀ·x = v` in place for a lower-triangular `l`.
#[inline]
pub fn solve_lower_transposed(l: &Mat3, v: &mut [Float]) {
    debug_assert!(v.len() >= 3);
    v[2] /= l[8];
    v[1] = (v[1] - l[7] * v[2]) / l[4];
    v[0] = (v[0] - l[3] * v[1] - l[6] * v[2]) / l[0];
}

/// `m · v`.
#[inline]
#[must_use]
pub fn mul_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// `mᵀ · v`.
#[inline]
#[must_use]
pub fn mul_vec_transposed(m: &Mat3, v: &Vec3) -> Vec3 {
    [
        m[0] * v[0] + m[3] * v[1] + m[6] * v[2],
        m[1] * v[0] + m[4] * v[1] + m[7] * v[2],
        m[2] * v[0] + m[5] * v[1] + m[8] * v[2],
    ]
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn lower_times_transpose(l: &Mat3) -> Mat3 {
        let mut m = [0.0; 9];
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    m[3 * i + j] += l[3 * i + k] * l[3 * j + k];
                }
            }
        }
        m
    }

    #[test]
    fn cholesky_recovers_known_factor() {
        let l = [2.0, 0.0, 0.0, -1.0, 3.0, 0.0, 0.5, -0.25, 1.5];
        let mut m = lower_times_transpose(&l);
        cholesky(&mut m).expect("positive definite by construction");
        for (got, want) in m.iter().zip(l.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_block() {
        let mut m = [1.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let err = cholesky(&mut m).expect_err("2x leading minor is negative");
        assert_eq!(err.row, 1);
    }

    #[test]
    fn triangular_solves_invert_each_other() {
        let l = [1.5, 0.0, 0.0, 0.3, 2.0, 0.0, -0.7, 0.1, 0.9];
        let x = [0.2, -1.1, 0.5];
        let mut v = mul_vec(&l, &x);
        solve_lower(&l, &mut v);
        for (got, want) in v.iter().zip(x.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }

        let mut v = mul_vec_transposed(&l, &x);
        solve_lower_transposed(&l, &mut v);
        for (got, want) in v.iter().zip(x.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn cholesky_roundtrip_on_random_factors() {
        arbtest::arbtest(|u| {
            let mut l = [0.0; 9];
            for (i, slot) in l.iter_mut().enumerate() {
                if i % 3 <= i / 3 {
                    let raw: i32 = u.int_in_range(-1000..=1000)?;
                    *slot = Float::from(raw) / 100.0;
                }
            }
            // Keep the diagonal well away from zero.
            for j in 0..3 {
                l[4 * j] = l[4 * j].abs() + 0.5;
            }

            let mut m = lower_times_transpose(&l);
            cholesky(&mut m).expect("factor has a positive diagonal");
            for (got, want) in m.iter().zip(l.iter()) {
                assert!((got - want).abs() < 1e-9, "{got} != {want}");
            }
            Ok(())
        });
    }
}
