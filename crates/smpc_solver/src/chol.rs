//! Block Cholesky of the Schur complement `S = E·H⁻¹·Eᵀ`.
//!
//! `S` is block tridiagonal with 3×3 blocks and identical for the x and y
//! axes as long as the Hessian weights are; the factor is block lower
//! bidiagonal and is formed analytically from the recurrence scalars —
//! `S` itself is never materialized.

use smpc_linalg::block3::{self, Mat3};
use smpc_linalg::Float;

use crate::{
    equality::InvHessian,
    error::SolverError,
    params::ProblemParams,
};

pub(crate) struct SchurFactor {
    n: usize,
    /// Lower-triangular diagonal blocks `L_ii`.
    diag: Vec<Mat3>,
    /// Sub-diagonal blocks `L_{i+1,i}` (upper-triangular valued).
    sub: Vec<Mat3>,
}

impl SchurFactor {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            diag: vec![[0.0; 9]; n],
            sub: vec![[0.0; 9]; n.saturating_sub(1)],
        }
    }

    /// Factorize the Schur complement for one axis.
    ///
    /// Block recurrences: `L_{i+1,i} = S_{i+1,i}·L_ii⁻ᵀ` and
    /// `L_{i+1,i+1} = chol(S_{i+1,i+1} − L_{i+1,i}·L_{i+1,i}ᵀ)`.
    pub fn form(
        &mut self,
        pp: &ProblemParams,
        inv: &InvHessian,
        axis: usize,
    ) -> Result<(), SolverError> {
        let n = self.n;

        let mut m = diagonal_block(pp, inv, axis, 0);
        block3::cholesky(&mut m)
            .map_err(|source| SolverError::NumericBreakdown { block: 0, source })?;
        self.diag[0] = m;

        for i in 1..n {
            // S_{i,i-1} = −Ã_i·diag(D_{i-1}), solved row-wise against L_{i-1,i-1}ᵀ.
            let d_prev = inv.state_diag(i - 1, axis);
            let sp = &pp.steps[i];
            let mut s_sub: Mat3 = [
                -d_prev[0],
                -sp.a3 * d_prev[1],
                -sp.a6 * d_prev[2],
                0.0,
                -d_prev[1],
                -sp.a3 * d_prev[2],
                0.0,
                0.0,
                -d_prev[2],
            ];
            for r in 0..3 {
                block3::solve_lower(&self.diag[i - 1], &mut s_sub[3 * r..3 * r + 3]);
            }

            let mut m = diagonal_block(pp, inv, axis, i);
            for r in 0..3 {
                for c in 0..3 {
                    for k in 0..3 {
                        m[3 * r + c] -= s_sub[3 * r + k] * s_sub[3 * c + k];
                    }
                }
            }
            block3::cholesky(&mut m)
                .map_err(|source| SolverError::NumericBreakdown { block: i, source })?;

            self.sub[i - 1] = s_sub;
            self.diag[i] = m;
        }
        Ok(())
    }

    /// In-place block forward substitution `L·y = rhs` for one axis of an
    /// interleaved `6N` vector.
    ///
    /// `first_block` skips untouched leading blocks: the active-set update
    /// forward-substitutes rows that are zero before the constrained
    /// sample's block.
    pub fn solve_forward(&self, rhs: &mut [Float], axis: usize, first_block: usize) {
        for i in first_block..self.n {
            let base = 6 * i + 3 * axis;
            if i > first_block {
                let prev = [rhs[base - 6], rhs[base - 5], rhs[base - 4]];
                let c = block3::mul_vec(&self.sub[i - 1], &prev);
                rhs[base] -= c[0];
                rhs[base + 1] -= c[1];
                rhs[base + 2] -= c[2];
            }
            block3::solve_lower(&self.diag[i], &mut rhs[base..base + 3]);
        }
    }

    /// In-place block backward substitution `Lᵀ·x = rhs` for one axis.
    pub fn solve_backward(&self, rhs: &mut [Float], axis: usize) {
        let n = self.n;
        let last = 6 * (n - 1) + 3 * axis;
        block3::solve_lower_transposed(&self.diag[n - 1], &mut rhs[last..last + 3]);
        for i in (0..n - 1).rev() {
            let base = 6 * i + 3 * axis;
            let next = [rhs[base + 6], rhs[base + 7], rhs[base + 8]];
            let c = block3::mul_vec_transposed(&self.sub[i], &next);
            rhs[base] -= c[0];
            rhs[base + 1] -= c[1];
            rhs[base + 2] -= c[2];
            block3::solve_lower_transposed(&self.diag[i], &mut rhs[base..base + 3]);
        }
    }

    /// Multiply `L·y` for one axis, for tests and residual checks.
    #[cfg(test)]
    pub fn multiply(&self, y: &[Float], out: &mut [Float], axis: usize) {
        for i in 0..self.n {
            let base = 6 * i + 3 * axis;
            let yi = [y[base], y[base + 1], y[base + 2]];
            let mut r = block3::mul_vec(&self.diag[i], &yi);
            // The diagonal blocks are stored lower-triangular, so the plain
            // product is already L_ii·yᵢ.
            if i > 0 {
                let yp = [y[base - 6], y[base - 5], y[base - 4]];
                let c = block3::mul_vec(&self.sub[i - 1], &yp);
                r[0] += c[0];
                r[1] += c[1];
                r[2] += c[2];
            }
            out[base] = r[0];
            out[base + 1] = r[1];
            out[base + 2] = r[2];
        }
    }
}

/// Dense value of `S_ii` for one axis.
fn diagonal_block(pp: &ProblemParams, inv: &InvHessian, axis: usize, i: usize) -> Mat3 {
    let sp = &pp.steps[i];
    let d = inv.state_diag(i, axis);
    let b = sp.b;
    let i2p = inv.control;

    let mut m = [0.0; 9];
    for r in 0..3 {
        m[4 * r] += d[r];
        for c in 0..3 {
            m[3 * r + c] += i2p * b[r] * b[c];
        }
    }
    if i > 0 {
        // Row i also touches state block i−1 through Ã.
        let dp = inv.state_diag(i - 1, axis);
        let (a3, a6) = (sp.a3, sp.a6);
        m[0] += dp[0] + a3 * a3 * dp[1] + a6 * a6 * dp[2];
        m[1] += a3 * dp[1] + a3 * a6 * dp[2];
        m[2] += a6 * dp[2];
        m[3] += a3 * dp[1] + a3 * a6 * dp[2];
        m[4] += dp[1] + a3 * a3 * dp[2];
        m[5] += a3 * dp[2];
        m[6] += a6 * dp[2];
        m[7] += a3 * dp[2];
        m[8] += dp[2];
    }
    m
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use smpc_linalg::{Float, Matrix};

    use super::*;
    use crate::{
        equality::{form_ex, form_i2h_etx},
        params::Gains,
    };

    fn sample_params(n: usize) -> ProblemParams {
        let mut pp = ProblemParams::new(n, &Gains::default()).expect("default gains are valid");
        let t: Vec<Float> = (0..n).map(|i| if i % 3 == 0 { 0.05 } else { 0.1 }).collect();
        pp.set(&t, &vec![0.0266; n], 0.0266);
        pp
    }

    /// Dense `S = E·H⁻¹·Eᵀ` assembled column by column through the
    /// matrix-free operators.
    fn dense_schur(pp: &ProblemParams) -> Matrix<Float> {
        let n = pp.n;
        let inv = InvHessian::uniform(pp);
        let mut s = Matrix::<Float>::zeros((6 * n, 6 * n));
        let mut e_j = vec![0.0; 6 * n];
        let mut scaled = vec![0.0; 8 * n];
        let mut col = vec![0.0; 6 * n];
        for j in 0..6 * n {
            e_j.fill(0.0);
            e_j[j] = 1.0;
            form_i2h_etx(pp, &inv, &e_j, &mut scaled);
            form_ex(pp, &scaled, &mut col);
            for i in 0..6 * n {
                s[(i, j)] = col[i];
            }
        }
        s
    }

    /// Dense factor assembled from the stored blocks, both axes.
    fn dense_factor(f: &SchurFactor, n: usize) -> Matrix<Float> {
        let mut l = Matrix::<Float>::zeros((6 * n, 6 * n));
        for axis in 0..2 {
            for i in 0..n {
                let base = 6 * i + 3 * axis;
                for r in 0..3 {
                    for c in 0..3 {
                        l[(base + r, base + c)] = f.diag[i][3 * r + c];
                        if i > 0 {
                            l[(base + r, base - 6 + c)] = f.sub[i - 1][3 * r + c];
                        }
                    }
                }
            }
        }
        l
    }

    #[test]
    fn factor_reproduces_the_schur_complement() {
        let n = 5;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let mut f = SchurFactor::new(n);
        f.form(&pp, &inv, 0).expect("SPD under positive gains");

        let s = dense_schur(&pp);
        let l = dense_factor(&f, n);
        let llt = l.dot(&l.t());
        for i in 0..6 * n {
            for j in 0..6 * n {
                assert_abs_diff_eq!(llt[(i, j)], s[(i, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn forward_solve_satisfies_the_cholesky_identity() {
        let n = 6;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let mut f = SchurFactor::new(n);
        f.form(&pp, &inv, 0).expect("SPD under positive gains");

        let mut rng = StdRng::seed_from_u64(42);
        let b: Vec<Float> = (0..6 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut y = b.clone();
        f.solve_forward(&mut y, 0, 0);
        f.solve_forward(&mut y, 1, 0);

        let mut back = vec![0.0; 6 * n];
        f.multiply(&y, &mut back, 0);
        f.multiply(&y, &mut back, 1);
        for (got, want) in back.iter().zip(&b) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-10);
        }
    }

    #[test]
    fn forward_then_backward_inverts_the_schur_complement() {
        let n = 4;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let mut f = SchurFactor::new(n);
        f.form(&pp, &inv, 0).expect("SPD under positive gains");

        let mut rng = StdRng::seed_from_u64(3);
        let b: Vec<Float> = (0..6 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut x = b.clone();
        for axis in 0..2 {
            f.solve_forward(&mut x, axis, 0);
            f.solve_backward(&mut x, axis);
        }

        // Apply S to the solution through the operators.
        let inv = InvHessian::uniform(&pp);
        let mut scaled = vec![0.0; 8 * n];
        let mut sx = vec![0.0; 6 * n];
        form_i2h_etx(&pp, &inv, &x, &mut scaled);
        form_ex(&pp, &scaled, &mut sx);
        for (got, want) in sx.iter().zip(&b) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-8);
        }
    }
}
