//! Per-tick problem parameters: the recurrence scalars of the discretized
//! inverted pendulum and the (inverse) Hessian diagonals.

use serde::{Deserialize, Serialize};
use smpc_linalg::Float;

use crate::{error::SolverError, state};

/// Diagonal objective weights.
///
/// `position` weighs the ZMP tracking error (the tilde position), the others
/// weigh velocity, acceleration and jerk magnitudes. All must be strictly
/// positive; `acceleration` doubles as the regularization that keeps the
/// Schur complement positive definite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Gains {
    pub position: Float,
    pub velocity: Float,
    pub acceleration: Float,
    pub jerk: Float,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            position: 8000.0,
            velocity: 1.0,
            acceleration: 0.02,
            jerk: 1.0,
        }
    }
}

impl Gains {
    pub(crate) fn validate(&self) -> Result<(), SolverError> {
        for (name, value) in [
            ("position", self.position),
            ("velocity", self.velocity),
            ("acceleration", self.acceleration),
            ("jerk", self.jerk),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SolverError::NonPositiveGain { name, value });
            }
        }
        Ok(())
    }
}

/// Recurrence scalars for one step of the horizon.
///
/// These are the only non-trivial entries of the 3×3 state transition and
/// the 3×1 control influence in tilde coordinates:
/// `Ã = [[1, a3, a6], [0, 1, a3], [0, 0, 1]]`, `B̃ = (b[0], b[1], b[2])`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StepParams {
    pub t: Float,
    pub h: Float,
    pub a3: Float,
    pub a6: Float,
    pub b: [Float; 3],
}

/// Parameter pack shared by both inner solvers.
pub(crate) struct ProblemParams {
    pub n: usize,
    /// Inverse Hessian diagonal of one state axis:
    /// `(1/position, 1/velocity, 1/acceleration)`.
    pub i2q: [Float; 3],
    /// Inverse Hessian entry of one control axis: `1/jerk`.
    pub i2p: Float,
    /// Height ratio of the incoming state, seeding the first step.
    pub h0: Float,
    pub steps: Vec<StepParams>,
}

impl ProblemParams {
    pub fn new(n: usize, gains: &Gains) -> Result<Self, SolverError> {
        gains.validate()?;
        Ok(Self {
            n,
            i2q: [
                1.0 / gains.position,
                1.0 / gains.velocity,
                1.0 / gains.acceleration,
            ],
            i2p: 1.0 / gains.jerk,
            h0: 0.0,
            steps: vec![StepParams::default(); n],
        })
    }

    /// Refresh the recurrence scalars for the tick.
    ///
    /// Step `i` advances from the state with height ratio `h_prev` (`h0` for
    /// the first step) to the one with `h[i]`; the tilde position picks up
    /// the difference, hence `a6 = T²/2 + h_prev − h_cur`.
    pub fn set(&mut self, t: &[Float], h: &[Float], h0: Float) {
        self.h0 = h0;
        for i in 0..self.n {
            let ti = t[i];
            let h_cur = h[i];
            let h_prev = if i == 0 { h0 } else { h[i - 1] };
            let t2 = ti * ti / 2.0;
            self.steps[i] = StepParams {
                t: ti,
                h: h_cur,
                a3: ti,
                a6: t2 + h_prev - h_cur,
                b: [t2 * ti / 3.0 - h_cur * ti, t2, ti],
            };
        }
    }

    /// Build the strictly feasible seed trajectory in place.
    ///
    /// The initial state is mapped to tilde coordinates and rolled forward
    /// with the closed-form jerk that puts the ZMP exactly on the reference
    /// points `(ref_x, ref_y)` — the footprint centers, which lie strictly
    /// inside their boxes.
    pub fn seed_trajectory(
        &self,
        ref_x: &[Float],
        ref_y: &[Float],
        init_state: &state::State,
        x: &mut [Float],
    ) {
        let n = self.n;
        debug_assert_eq!(x.len(), 8 * n);

        let mut prev = init_state.0;
        state::orig_to_tilde(self.h0, &mut prev);

        for i in 0..n {
            let sp = &self.steps[i];
            // inv(Cp·B) is diagonal with both entries 1/b[0]; b[0] stays
            // away from zero for any realistic period and CoM height.
            let icpb = 1.0 / sp.b[0];

            let jx = icpb * (ref_x[i] - (prev[0] + sp.a3 * prev[1] + sp.a6 * prev[2]));
            let jy = icpb * (ref_y[i] - (prev[3] + sp.a3 * prev[4] + sp.a6 * prev[5]));

            let cur = [
                prev[0] + sp.a3 * prev[1] + sp.a6 * prev[2] + sp.b[0] * jx,
                prev[1] + sp.a3 * prev[2] + sp.b[1] * jx,
                prev[2] + sp.b[2] * jx,
                prev[3] + sp.a3 * prev[4] + sp.a6 * prev[5] + sp.b[0] * jy,
                prev[4] + sp.a3 * prev[5] + sp.b[1] * jy,
                prev[5] + sp.b[2] * jy,
            ];

            x[6 * i..6 * i + 6].copy_from_slice(&cur);
            x[6 * n + 2 * i] = jx;
            x[6 * n + 2 * i + 1] = jy;
            prev = cur;
        }
    }
}

/// Objective value of a candidate trajectory under the given gains.
pub(crate) fn objective_value(
    gains: &Gains,
    n: usize,
    zref_x: &[Float],
    zref_y: &[Float],
    x: &[Float],
) -> Float {
    let mut f = 0.0;
    for i in 0..n {
        let zx = x[6 * i] - zref_x[i];
        let zy = x[6 * i + 3] - zref_y[i];
        let (vx, ax) = (x[6 * i + 1], x[6 * i + 2]);
        let (vy, ay) = (x[6 * i + 4], x[6 * i + 5]);
        let (jx, jy) = (x[6 * n + 2 * i], x[6 * n + 2 * i + 1]);
        f += 0.5 * gains.position * (zx * zx + zy * zy)
            + 0.5 * gains.velocity * (vx * vx + vy * vy)
            + 0.5 * gains.acceleration * (ax * ax + ay * ay)
            + 0.5 * gains.jerk * (jx * jx + jy * jy);
    }
    f
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::state::State;

    #[test]
    fn constant_height_reduces_a6_to_half_t_squared() {
        let mut pp = ProblemParams::new(3, &Gains::default()).expect("default gains are valid");
        pp.set(&[0.1; 3], &[0.0266; 3], 0.0266);
        for sp in &pp.steps {
            assert_abs_diff_eq!(sp.a6, 0.005, epsilon = 1e-15);
            assert_abs_diff_eq!(sp.b[1], 0.005, epsilon = 1e-15);
            assert_abs_diff_eq!(sp.b[0], 0.001 / 6.0 - 0.0266 * 0.1, epsilon = 1e-15);
        }
    }

    #[test]
    fn varying_height_enters_the_position_row() {
        let mut pp = ProblemParams::new(2, &Gains::default()).expect("default gains are valid");
        pp.set(&[0.1; 2], &[0.03, 0.05], 0.02);
        assert_abs_diff_eq!(pp.steps[0].a6, 0.005 + 0.02 - 0.03, epsilon = 1e-15);
        assert_abs_diff_eq!(pp.steps[1].a6, 0.005 + 0.03 - 0.05, epsilon = 1e-15);
    }

    #[test]
    fn rejects_non_positive_gains() {
        let gains = Gains { acceleration: 0.0, ..Gains::default() };
        assert!(matches!(
            ProblemParams::new(4, &gains),
            Err(SolverError::NonPositiveGain { name: "acceleration", .. })
        ));
    }

    #[test]
    fn seed_trajectory_rides_the_reference_points() {
        let n = 4;
        let mut pp = ProblemParams::new(n, &Gains::default()).expect("default gains are valid");
        let h = 0.261 / 9.81;
        pp.set(&[0.1; 4], &[h; 4], h);

        let ref_x = [0.01, 0.02, 0.02, 0.035];
        let ref_y = [0.05, 0.05, -0.05, -0.05];
        let init = State([0.0, 0.1, 0.0, 0.05, 0.0, 0.0]);
        let mut x = vec![0.0; 8 * n];
        pp.seed_trajectory(&ref_x, &ref_y, &init, &mut x);

        // The tilde position of every predicted state is the reference.
        for i in 0..n {
            assert_abs_diff_eq!(x[6 * i], ref_x[i], epsilon = 1e-9);
            assert_abs_diff_eq!(x[6 * i + 3], ref_y[i], epsilon = 1e-9);
        }
    }
}
