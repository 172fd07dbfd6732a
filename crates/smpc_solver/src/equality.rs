//! Matrix-free products with the equality-constraint operator.
//!
//! `E` encodes the tilde-state recurrence over the horizon. Its block row
//! `i` reads `Ã·x̃ᵢ + B̃·uᵢ − x̃ᵢ₊₁`; the fixed initial state does not appear
//! in the operator (it only shifts the constraint right-hand side). Every
//! product touches the two state blocks and one control block a row
//! couples, so all three operations are linear in the horizon length.

use smpc_linalg::Float;

use crate::params::ProblemParams;

/// A per-sample inverse weight, uniform for the active-set solver and
/// barrier-modified per sample for the interior-point solver.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WeightSeq<'a> {
    Uniform(Float),
    PerSample(&'a [Float]),
}

impl WeightSeq<'_> {
    #[inline]
    pub fn at(&self, i: usize) -> Float {
        match self {
            Self::Uniform(w) => *w,
            Self::PerSample(w) => w[i],
        }
    }
}

/// Inverse diagonal of the (possibly barrier-augmented) Hessian.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InvHessian<'a> {
    /// Inverse weight of the tilde-position entries, per axis.
    pub z: [WeightSeq<'a>; 2],
    pub velocity: Float,
    pub acceleration: Float,
    pub control: Float,
}

impl InvHessian<'_> {
    pub fn uniform(pp: &ProblemParams) -> InvHessian<'static> {
        InvHessian {
            z: [WeightSeq::Uniform(pp.i2q[0]), WeightSeq::Uniform(pp.i2q[0])],
            velocity: pp.i2q[1],
            acceleration: pp.i2q[2],
            control: pp.i2p,
        }
    }

    /// Inverse Hessian diagonal of state block `i` along `axis`.
    #[inline]
    pub fn state_diag(&self, i: usize, axis: usize) -> [Float; 3] {
        [self.z[axis].at(i), self.velocity, self.acceleration]
    }
}

/// `out = E·x` (length `6N`).
pub(crate) fn form_ex(pp: &ProblemParams, x: &[Float], out: &mut [Float]) {
    let n = pp.n;
    for axis in 0..2 {
        for i in 0..n {
            let sp = &pp.steps[i];
            let u = x[6 * n + 2 * i + axis];
            let cur = 6 * i + 3 * axis;
            let next = &x[cur..cur + 3];
            let mut r = [sp.b[0] * u - next[0], sp.b[1] * u - next[1], sp.b[2] * u - next[2]];
            if i > 0 {
                let prev = &x[cur - 6..cur - 3];
                r[0] += prev[0] + sp.a3 * prev[1] + sp.a6 * prev[2];
                r[1] += prev[1] + sp.a3 * prev[2];
                r[2] += prev[2];
            }
            out[cur..cur + 3].copy_from_slice(&r);
        }
    }
}

/// `out = Eᵀ·ν` (length `8N`).
pub(crate) fn form_etx(pp: &ProblemParams, nu: &[Float], out: &mut [Float]) {
    let n = pp.n;
    for axis in 0..2 {
        for k in 0..n {
            let base = 6 * k + 3 * axis;
            let cur = [nu[base], nu[base + 1], nu[base + 2]];

            // State block k holds x̃ₖ₊₁: hit by −I from row k and by Ãᵀ from
            // row k+1 (when there is one).
            let mut s = [-cur[0], -cur[1], -cur[2]];
            if k + 1 < n {
                let sp = &pp.steps[k + 1];
                let nxt = [nu[base + 6], nu[base + 7], nu[base + 8]];
                s[0] += nxt[0];
                s[1] += sp.a3 * nxt[0] + nxt[1];
                s[2] += sp.a6 * nxt[0] + sp.a3 * nxt[1] + nxt[2];
            }
            out[base..base + 3].copy_from_slice(&s);

            let sp = &pp.steps[k];
            out[6 * n + 2 * k + axis] =
                sp.b[0] * cur[0] + sp.b[1] * cur[1] + sp.b[2] * cur[2];
        }
    }
}

/// Scale a decision-space vector by the inverse Hessian diagonal in place.
pub(crate) fn apply_inv_hessian(inv: &InvHessian, n: usize, v: &mut [Float]) {
    for axis in 0..2 {
        for k in 0..n {
            let d = inv.state_diag(k, axis);
            let base = 6 * k + 3 * axis;
            v[base] *= d[0];
            v[base + 1] *= d[1];
            v[base + 2] *= d[2];
            v[6 * n + 2 * k + axis] *= inv.control;
        }
    }
}

/// `out = H⁻¹·Eᵀ·ν` for a diagonal inverse Hessian.
pub(crate) fn form_i2h_etx(
    pp: &ProblemParams,
    inv: &InvHessian,
    nu: &[Float],
    out: &mut [Float],
) {
    form_etx(pp, nu, out);
    apply_inv_hessian(inv, pp.n, out);
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use smpc_linalg::Float;

    use super::*;
    use crate::{params::Gains, state::State};

    fn sample_params(n: usize) -> ProblemParams {
        let mut pp = ProblemParams::new(n, &Gains::default()).expect("default gains are valid");
        let t: Vec<Float> = (0..n).map(|i| if i % 2 == 0 { 0.1 } else { 0.05 }).collect();
        let h: Vec<Float> = (0..n).map(|i| 0.025 + 0.001 * i as Float).collect();
        pp.set(&t, &h, 0.0266);
        pp
    }

    #[test]
    fn adjoint_identity_holds_for_random_vectors() {
        let n = 6;
        let pp = sample_params(n);
        let mut rng = StdRng::seed_from_u64(7);

        let x: Vec<Float> = (0..8 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let nu: Vec<Float> = (0..6 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut ex = vec![0.0; 6 * n];
        form_ex(&pp, &x, &mut ex);
        let mut etnu = vec![0.0; 8 * n];
        form_etx(&pp, &nu, &mut etnu);

        let lhs: Float = ex.iter().zip(&nu).map(|(a, b)| a * b).sum();
        let rhs: Float = x.iter().zip(&etnu).map(|(a, b)| a * b).sum();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn seed_trajectory_satisfies_the_recurrence() {
        let n = 5;
        let pp = sample_params(n);
        let init = State([0.01, -0.05, 0.4, 0.05, 0.02, -0.1]);
        let mut x = vec![0.0; 8 * n];
        pp.seed_trajectory(&vec![0.03; n], &vec![-0.01; n], &init, &mut x);

        let mut residual = vec![0.0; 6 * n];
        form_ex(&pp, &x, &mut residual);

        // Row 0 carries the folded-in initial state, −Ã·x̃₀; later rows
        // vanish for any trajectory generated by the recurrence.
        let mut tilde = init.0;
        crate::state::orig_to_tilde(pp.h0, &mut tilde);
        let sp = &pp.steps[0];
        for axis in 0..2 {
            let t = &tilde[3 * axis..3 * axis + 3];
            let expected = [
                -(t[0] + sp.a3 * t[1] + sp.a6 * t[2]),
                -(t[1] + sp.a3 * t[2]),
                -t[2],
            ];
            for k in 0..3 {
                assert_abs_diff_eq!(residual[3 * axis + k], expected[k], epsilon = 1e-10);
            }
        }
        for r in &residual[6..] {
            assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn scaled_adjoint_divides_by_the_hessian_diagonal() {
        let n = 4;
        let pp = sample_params(n);
        let inv = InvHessian::uniform(&pp);
        let nu: Vec<Float> = (0..6 * n).map(|i| (i as Float).sin()).collect();

        let mut plain = vec![0.0; 8 * n];
        form_etx(&pp, &nu, &mut plain);
        let mut scaled = vec![0.0; 8 * n];
        form_i2h_etx(&pp, &inv, &nu, &mut scaled);

        for k in 0..n {
            assert_abs_diff_eq!(scaled[6 * k], plain[6 * k] * pp.i2q[0], epsilon = 1e-12);
            assert_abs_diff_eq!(scaled[6 * k + 4], plain[6 * k + 4] * pp.i2q[1], epsilon = 1e-12);
            assert_abs_diff_eq!(scaled[6 * k + 5], plain[6 * k + 5] * pp.i2q[2], epsilon = 1e-12);
            assert_abs_diff_eq!(
                scaled[6 * n + 2 * k + 1],
                plain[6 * n + 2 * k + 1] * pp.i2p,
                epsilon = 1e-12
            );
        }
    }
}
