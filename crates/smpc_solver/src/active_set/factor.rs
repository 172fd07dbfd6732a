//! Augmented Cholesky factor for the active-set method.
//!
//! The KKT matrix of the equality constraints plus the active rows factors
//! as `[ecL 0; La Ld]`: the leading part is the block-bidiagonal factor of
//! the Schur complement, and every activated constraint appends one row
//! whose first `6N` entries come from a sparse forward substitution and
//! whose trailing entries form a dense lower triangle.
//!
//! Rows live in individually owned buffers so that removal is a pointer
//! shuffle; the Givens sweep then restores triangularity in place.

use smpc_linalg::block3::NonPositivePivot;
use smpc_linalg::{Float, Givens};

use crate::{chol::SchurFactor, error::SolverError, params::ProblemParams};

use super::ActiveConstraint;

pub(crate) struct ConstraintFactor {
    n: usize,
    rows: Vec<Box<[Float]>>,
    /// First decision-vector index a row touches (6 × its sample).
    starts: Vec<usize>,
    count: usize,
    /// Forward-substituted right-hand side: `6N` equality entries plus one
    /// trailing entry per active row.
    z: Vec<Float>,
}

impl ConstraintFactor {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            rows: (0..2 * n).map(|_| vec![0.0; 8 * n].into_boxed_slice()).collect(),
            starts: vec![0; 2 * n],
            count: 0,
            z: vec![0.0; 8 * n],
        }
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    /// Start a fresh tick: no active rows, equality part of `z` replaced.
    pub fn reset(&mut self, z_top: &[Float]) {
        self.count = 0;
        self.z[..6 * self.n].copy_from_slice(z_top);
    }

    /// Append the row of a newly activated constraint and extend `z`.
    ///
    /// `rhs_tail` is the constraint's right-hand-side entry,
    /// `−aᵀ(x + H⁻¹g)` at activation time.
    pub fn add_row(
        &mut self,
        pp: &ProblemParams,
        ec: &SchurFactor,
        active: &[ActiveConstraint],
        con: &ActiveConstraint,
        rhs_tail: Float,
    ) -> Result<(), SolverError> {
        let n6 = 6 * self.n;
        let m = self.count;
        debug_assert_eq!(m, active.len());
        let sample = con.ind / 6;
        let start = con.ind;
        let i2h = pp.i2q[0];

        let (done, rest) = self.rows.split_at_mut(m);
        let row = &mut rest[0];
        row[..n6 + m + 1].fill(0.0);

        // Sparse image of the constraint under E·H⁻¹: the sample's own
        // equality row and, unless it is the last sample, the next one.
        row[con.ind] = -i2h * con.coef_x;
        row[con.ind + 3] = -i2h * con.coef_y;
        if sample + 1 < self.n {
            row[con.ind + 6] = i2h * con.coef_x;
            row[con.ind + 9] = i2h * con.coef_y;
        }
        ec.solve_forward(row, 0, sample);
        ec.solve_forward(row, 1, sample);

        // Dense tail: one forward-substitution step per existing row.
        for (j, prev) in active.iter().enumerate() {
            let rj = &done[j];
            // Constraints of the same sample overlap through H⁻¹.
            let mut val = if prev.ind == con.ind {
                i2h * (prev.coef_x * con.coef_x + prev.coef_y * con.coef_y)
            } else {
                0.0
            };
            for t in self.starts[j].max(start)..n6 {
                val -= rj[t] * row[t];
            }
            for l in 0..j {
                val -= rj[n6 + l] * row[n6 + l];
            }
            row[n6 + j] = val / rj[n6 + j];
        }

        let mut d = i2h;
        for t in start..n6 {
            d -= row[t] * row[t];
        }
        for l in 0..m {
            d -= row[n6 + l] * row[n6 + l];
        }
        if d <= 0.0 {
            return Err(SolverError::NumericBreakdown {
                block: sample,
                source: NonPositivePivot { row: m, value: d },
            });
        }
        row[n6 + m] = d.sqrt();

        let mut zv = rhs_tail;
        for t in start..n6 {
            zv -= row[t] * self.z[t];
        }
        for l in 0..m {
            zv -= row[n6 + l] * self.z[n6 + l];
        }
        self.z[n6 + m] = zv / row[n6 + m];

        self.starts[m] = start;
        self.count = m + 1;
        Ok(())
    }

    /// Remove row `k`: shuffle it to the spare region, then sweep the
    /// trailing block with Givens rotations to restore triangularity,
    /// rotating `z` along.
    pub fn remove_row(&mut self, k: usize) {
        let n6 = 6 * self.n;
        let m = self.count;
        debug_assert!(k < m);

        let buf = self.rows.remove(k);
        self.rows.insert(m - 1, buf);
        let st = self.starts.remove(k);
        self.starts.insert(m - 1, st);
        self.count = m - 1;

        for i in k..self.count {
            let (head, tail) = self.rows.split_at_mut(i + 1);
            let row = &mut head[i];
            let g = Givens::zeroing(row[n6 + i], row[n6 + i + 1]);
            let (a, b) = g.apply(row[n6 + i], row[n6 + i + 1]);
            row[n6 + i] = a;
            row[n6 + i + 1] = b;
            for rj in tail.iter_mut().take(self.count - i - 1) {
                let (a, b) = g.apply(rj[n6 + i], rj[n6 + i + 1]);
                rj[n6 + i] = a;
                rj[n6 + i + 1] = b;
            }
            let (a, b) = g.apply(self.z[n6 + i], self.z[n6 + i + 1]);
            self.z[n6 + i] = a;
            self.z[n6 + i + 1] = b;
        }
    }

    /// Backward-substitute the full augmented system: Lagrange multipliers
    /// of the active rows into `lambda`, equality multipliers into `nu`.
    pub fn solve_multipliers(
        &self,
        ec: &SchurFactor,
        nu: &mut [Float],
        lambda: &mut [Float],
    ) {
        let n6 = 6 * self.n;
        let m = self.count;
        debug_assert!(lambda.len() >= m);

        for k in (0..m).rev() {
            let mut v = self.z[n6 + k];
            for j in k + 1..m {
                v -= self.rows[j][n6 + k] * lambda[j];
            }
            lambda[k] = v / self.rows[k][n6 + k];
        }

        nu.copy_from_slice(&self.z[..n6]);
        for j in 0..m {
            let lj = lambda[j];
            let rj = &self.rows[j];
            for t in self.starts[j]..n6 {
                nu[t] -= rj[t] * lj;
            }
        }
        ec.solve_backward(nu, 0);
        ec.solve_backward(nu, 1);
    }

    #[cfg(test)]
    pub fn row(&self, j: usize) -> &[Float] {
        &self.rows[j]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use smpc_linalg::{Float, Matrix};

    use super::*;
    use crate::{
        equality::{form_ex, form_i2h_etx, InvHessian},
        params::Gains,
    };

    fn sample_params(n: usize) -> ProblemParams {
        let mut pp = ProblemParams::new(n, &Gains::default()).expect("default gains are valid");
        pp.set(&vec![0.1; n], &vec![0.0266; n], 0.0266);
        pp
    }

    fn unit(cind: usize, ind: usize, coef_x: Float, coef_y: Float) -> ActiveConstraint {
        debug_assert!((coef_x * coef_x + coef_y * coef_y - 1.0).abs() < 1e-12);
        ActiveConstraint { cind, ind, coef_x, coef_y }
    }

    /// Dense augmented KKT matrix `[S C; Cᵀ D]` for a working set.
    fn dense_kkt(pp: &ProblemParams, active: &[ActiveConstraint]) -> Matrix<Float> {
        let n6 = 6 * pp.n;
        let m = active.len();
        let inv = InvHessian::uniform(pp);
        let i2h = pp.i2q[0];
        let mut kkt = Matrix::<Float>::zeros((n6 + m, n6 + m));

        let mut e_j = vec![0.0; n6];
        let mut scaled = vec![0.0; 8 * pp.n];
        let mut col = vec![0.0; n6];
        for j in 0..n6 {
            e_j.fill(0.0);
            e_j[j] = 1.0;
            form_i2h_etx(pp, &inv, &e_j, &mut scaled);
            form_ex(pp, &scaled, &mut col);
            for i in 0..n6 {
                kkt[(i, j)] = col[i];
            }
        }

        let mut ia = vec![0.0; 8 * pp.n];
        for (k, a) in active.iter().enumerate() {
            ia.fill(0.0);
            ia[a.ind] = i2h * a.coef_x;
            ia[a.ind + 3] = i2h * a.coef_y;
            form_ex(pp, &ia, &mut col);
            for i in 0..n6 {
                kkt[(i, n6 + k)] = col[i];
                kkt[(n6 + k, i)] = col[i];
            }
            for (l, b) in active.iter().enumerate() {
                if b.ind == a.ind {
                    kkt[(n6 + k, n6 + l)] =
                        i2h * (a.coef_x * b.coef_x + a.coef_y * b.coef_y);
                }
            }
        }
        kkt
    }

    /// Dense augmented factor: the block-bidiagonal part on top, the stored
    /// constraint rows below.
    fn dense_factor(
        pp: &ProblemParams,
        ec: &SchurFactor,
        factor: &ConstraintFactor,
    ) -> Matrix<Float> {
        let n6 = 6 * pp.n;
        let m = factor.count();
        let mut l = Matrix::<Float>::zeros((n6 + m, n6 + m));

        let mut e_j = vec![0.0; n6];
        let mut col = vec![0.0; n6];
        for j in 0..n6 {
            e_j.fill(0.0);
            e_j[j] = 1.0;
            ec.multiply(&e_j, &mut col, 0);
            ec.multiply(&e_j, &mut col, 1);
            for i in 0..n6 {
                l[(i, j)] = col[i];
            }
        }
        for k in 0..m {
            let row = factor.row(k);
            for j in 0..n6 {
                l[(n6 + k, j)] = row[j];
            }
            for j in 0..=k {
                l[(n6 + k, n6 + j)] = row[n6 + j];
            }
        }
        l
    }

    #[test]
    fn downdate_preserves_the_cholesky_identity() {
        let n = 3;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let mut ec = SchurFactor::new(n);
        ec.form(&pp, &inv, 0).expect("SPD under positive gains");

        let a0 = unit(0, 0, 1.0, 0.0);
        let a1 = unit(3, 6, 0.6, 0.8);
        let a2 = unit(5, 12, 0.0, 1.0);

        let mut factor = ConstraintFactor::new(n);
        factor.reset(&vec![0.0; 6 * n]);
        factor.add_row(&pp, &ec, &[], &a0, 0.0).expect("pivot stays positive");
        factor.add_row(&pp, &ec, &[a0], &a1, 0.0).expect("pivot stays positive");
        factor
            .add_row(&pp, &ec, &[a0, a1], &a2, 0.0)
            .expect("pivot stays positive");

        factor.remove_row(1);
        assert_eq!(factor.count(), 2);

        let l = dense_factor(&pp, &ec, &factor);
        let kkt = dense_kkt(&pp, &[a0, a2]);
        let llt = l.dot(&l.t());
        for i in 0..6 * n + 2 {
            for j in 0..6 * n + 2 {
                assert_abs_diff_eq!(llt[(i, j)], kkt[(i, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn downdate_rotates_the_substituted_rhs_consistently() {
        let n = 3;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let mut ec = SchurFactor::new(n);
        ec.form(&pp, &inv, 0).expect("SPD under positive gains");

        let a0 = unit(1, 0, 0.0, 1.0);
        let a1 = unit(2, 6, 1.0, 0.0);
        let a2 = unit(4, 12, 0.8, -0.6);

        let mut rng = StdRng::seed_from_u64(11);
        let mut z_top: Vec<Float> = (0..6 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        ec.solve_forward(&mut z_top, 0, 0);
        ec.solve_forward(&mut z_top, 1, 0);
        let tails = [0.3, -0.7, 0.2];

        let mut factor = ConstraintFactor::new(n);
        factor.reset(&z_top);
        factor.add_row(&pp, &ec, &[], &a0, tails[0]).expect("pivot stays positive");
        factor.add_row(&pp, &ec, &[a0], &a1, tails[1]).expect("pivot stays positive");
        factor
            .add_row(&pp, &ec, &[a0, a1], &a2, tails[2])
            .expect("pivot stays positive");
        factor.remove_row(0);

        // A factor built from scratch over the surviving rows must yield the
        // same multipliers.
        let mut fresh = ConstraintFactor::new(n);
        fresh.reset(&z_top);
        fresh.add_row(&pp, &ec, &[], &a1, tails[1]).expect("pivot stays positive");
        fresh.add_row(&pp, &ec, &[a1], &a2, tails[2]).expect("pivot stays positive");

        let mut nu_a = vec![0.0; 6 * n];
        let mut nu_b = vec![0.0; 6 * n];
        let mut lam_a = [0.0; 2];
        let mut lam_b = [0.0; 2];
        factor.solve_multipliers(&ec, &mut nu_a, &mut lam_a);
        fresh.solve_multipliers(&ec, &mut nu_b, &mut lam_b);

        for (a, b) in lam_a.iter().zip(&lam_b) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
        for (a, b) in nu_a.iter().zip(&nu_b) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }
}
