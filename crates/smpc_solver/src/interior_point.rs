//! Log-barrier interior-point solver.
//!
//! The support boxes enter as a log barrier weighted by `1/t`; each outer
//! iteration multiplies `t` and runs a damped Newton loop whose equality
//! system is solved through the same block-bidiagonal factor as the
//! active-set method, with the barrier Hessian entering as a per-sample
//! diagonal z-weight (one factor per axis, since the weights differ). The
//! gradient is exact, and a backtracking line search keeps every iterate
//! strictly feasible.

use serde::{Deserialize, Serialize};
use smpc_linalg::Float;
use tracing::{debug, trace};

use crate::{
    chol::SchurFactor,
    constraints::{self, BoxConstraint},
    equality::{apply_inv_hessian, form_etx, form_ex, InvHessian, WeightSeq},
    error::{SolveStatus, SolverError},
    params::{objective_value, Gains, ProblemParams},
    state::{self, Control, State},
    Parameters, PreviewSolver,
};

/// Backtracking policy wrapped around each Newton step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineSearch {
    /// Shrink until the barrier objective is finite and satisfies the
    /// sufficient-decrease condition.
    #[default]
    LogBarrier,
    /// No backtracking: take the full Newton step clipped to a fixed
    /// fraction of the distance to the nearest box face.
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct InteriorPointOptions {
    /// Newton decrement threshold ending an inner loop.
    pub tolerance: Float,
    /// Duality-gap proxy threshold ending the outer loop.
    pub tol_outer: Float,
    /// Initial barrier parameter.
    pub t0: Float,
    /// Barrier multiplier between outer iterations.
    pub mu: Float,
    /// Sufficient-decrease fraction of the directional derivative.
    pub bs_alpha: Float,
    /// Step shrink factor of the backtracking search.
    pub bs_beta: Float,
    /// Cap on outer iterations; 0 means unlimited.
    pub max_outer: usize,
    /// Cap on Newton steps per outer iteration.
    pub max_inner: usize,
    pub line_search: LineSearch,
    /// Record the objective value after every outer iteration.
    pub log_objective: bool,
}

impl Default for InteriorPointOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            tol_outer: 1e-2,
            t0: 1e-1,
            mu: 10.0,
            bs_alpha: 0.01,
            bs_beta: 0.95,
            max_outer: 10,
            max_inner: 20,
            line_search: LineSearch::LogBarrier,
            log_objective: false,
        }
    }
}

pub struct InteriorPointSolver {
    n: usize,
    gains: Gains,
    opts: InteriorPointOptions,
    pp: ProblemParams,
    ec_x: SchurFactor,
    ec_y: SchurFactor,
    constraints: Vec<BoxConstraint>,

    x: Vec<Float>,
    dx: Vec<Float>,
    grad: Vec<Float>,
    scratch: Vec<Float>,
    trial: Vec<Float>,
    rhs: Vec<Float>,
    wz_x: Vec<Float>,
    wz_y: Vec<Float>,

    zref_x: Vec<Float>,
    zref_y: Vec<Float>,
    objective_log: Vec<Float>,

    outer_iterations: usize,
    inner_iterations: usize,
    backtracks: usize,
}

impl InteriorPointSolver {
    pub fn new(
        n: usize,
        gains: Gains,
        opts: InteriorPointOptions,
    ) -> Result<Self, SolverError> {
        let pp = ProblemParams::new(n, &gains)?;
        Ok(Self {
            n,
            gains,
            opts,
            pp,
            ec_x: SchurFactor::new(n),
            ec_y: SchurFactor::new(n),
            constraints: Vec::with_capacity(2 * n),
            x: vec![0.0; 8 * n],
            dx: vec![0.0; 8 * n],
            grad: vec![0.0; 8 * n],
            scratch: vec![0.0; 8 * n],
            trial: vec![0.0; 8 * n],
            rhs: vec![0.0; 6 * n],
            wz_x: vec![0.0; n],
            wz_y: vec![0.0; n],
            zref_x: vec![0.0; n],
            zref_y: vec![0.0; n],
            objective_log: Vec::new(),
            outer_iterations: 0,
            inner_iterations: 0,
            backtracks: 0,
        })
    }

    #[must_use]
    pub fn outer_iterations(&self) -> usize {
        self.outer_iterations
    }

    #[must_use]
    pub fn inner_iterations(&self) -> usize {
        self.inner_iterations
    }

    #[must_use]
    pub fn backtrack_count(&self) -> usize {
        self.backtracks
    }

    #[must_use]
    pub fn objective_log(&self) -> &[Float] {
        &self.objective_log
    }

    /// Barrier value of a candidate point; `None` outside the boxes.
    fn barrier(&self, x: &[Float]) -> Option<Float> {
        let mut b = 0.0;
        for c in &self.constraints {
            let v = c.value(x);
            let low = v - c.lb;
            let high = c.ub - v;
            if low <= 0.0 || high <= 0.0 {
                return None;
            }
            b -= low.ln() + high.ln();
        }
        Some(b)
    }

    fn merit(&self, t: Float, x: &[Float]) -> Option<Float> {
        let f = objective_value(&self.gains, self.n, &self.zref_x, &self.zref_y, x);
        self.barrier(x).map(|b| t * f + b)
    }

    /// One Newton system: exact barrier gradient, per-sample diagonal
    /// z-weights for the Hessian. Fills `dx` and returns the decrement
    /// `−∇φᵀ·Δ`.
    fn newton_direction(&mut self, t: Float) -> Result<Float, SolverError> {
        let n = self.n;
        let g = &self.gains;

        for i in 0..n {
            let base = 6 * i;
            self.grad[base] = t * g.position * (self.x[base] - self.zref_x[i]);
            self.grad[base + 1] = t * g.velocity * self.x[base + 1];
            self.grad[base + 2] = t * g.acceleration * self.x[base + 2];
            self.grad[base + 3] = t * g.position * (self.x[base + 3] - self.zref_y[i]);
            self.grad[base + 4] = t * g.velocity * self.x[base + 4];
            self.grad[base + 5] = t * g.acceleration * self.x[base + 5];
            self.grad[6 * n + 2 * i] = t * g.jerk * self.x[6 * n + 2 * i];
            self.grad[6 * n + 2 * i + 1] = t * g.jerk * self.x[6 * n + 2 * i + 1];

            let cx = self.constraints[2 * i];
            let cy = self.constraints[2 * i + 1];
            let vx = cx.value(&self.x);
            let vy = cy.value(&self.x);
            let gx = 1.0 / (cx.ub - vx) - 1.0 / (vx - cx.lb);
            let gy = 1.0 / (cy.ub - vy) - 1.0 / (vy - cy.lb);
            self.grad[base] += cx.coef_x * gx + cy.coef_x * gy;
            self.grad[base + 3] += cx.coef_y * gx + cy.coef_y * gy;

            let kx = (cx.ub - vx).powi(-2) + (vx - cx.lb).powi(-2);
            let ky = (cy.ub - vy).powi(-2) + (vy - cy.lb).powi(-2);
            self.wz_x[i] =
                1.0 / (t * g.position + cx.coef_x * cx.coef_x * kx + cy.coef_x * cy.coef_x * ky);
            self.wz_y[i] =
                1.0 / (t * g.position + cx.coef_y * cx.coef_y * kx + cy.coef_y * cy.coef_y * ky);
        }

        let inv = InvHessian {
            z: [
                WeightSeq::PerSample(&self.wz_x),
                WeightSeq::PerSample(&self.wz_y),
            ],
            velocity: 1.0 / (t * g.velocity),
            acceleration: 1.0 / (t * g.acceleration),
            control: 1.0 / (t * g.jerk),
        };
        self.ec_x.form(&self.pp, &inv, 0)?;
        self.ec_y.form(&self.pp, &inv, 1)?;

        // ν from the Schur system, then Δ = −H⁻¹(∇φ + Eᵀν).
        self.scratch.copy_from_slice(&self.grad);
        apply_inv_hessian(&inv, n, &mut self.scratch);
        form_ex(&self.pp, &self.scratch, &mut self.rhs);
        for v in &mut self.rhs {
            *v = -*v;
        }
        self.ec_x.solve_forward(&mut self.rhs, 0, 0);
        self.ec_x.solve_backward(&mut self.rhs, 0);
        self.ec_y.solve_forward(&mut self.rhs, 1, 0);
        self.ec_y.solve_backward(&mut self.rhs, 1);

        form_etx(&self.pp, &self.rhs, &mut self.dx);
        for (d, gr) in self.dx.iter_mut().zip(&self.grad) {
            *d += gr;
        }
        apply_inv_hessian(&inv, n, &mut self.dx);
        let mut decrement = 0.0;
        for (d, gr) in self.dx.iter_mut().zip(&self.grad) {
            *d = -*d;
            decrement -= gr * *d;
        }
        Ok(decrement)
    }

    /// Step length along `dx`, and the number of shrink steps taken.
    fn line_search(&mut self, t: Float, slope: Float) -> (Float, usize) {
        match self.opts.line_search {
            LineSearch::None => {
                let mut alpha: Float = 1.0;
                for c in &self.constraints {
                    let v = c.value(&self.x);
                    let dv = c.direction(&self.dx);
                    if dv > Float::EPSILON {
                        alpha = alpha.min(0.99 * (c.ub - v) / dv);
                    } else if dv < -Float::EPSILON {
                        alpha = alpha.min(0.99 * (c.lb - v) / dv);
                    }
                }
                (alpha.max(0.0), 0)
            }
            LineSearch::LogBarrier => {
                let Some(phi0) = self.merit(t, &self.x) else {
                    return (0.0, 0);
                };
                let mut alpha: Float = 1.0;
                let mut shrinks = 0;
                loop {
                    for (tr, (xv, dv)) in self
                        .trial
                        .iter_mut()
                        .zip(self.x.iter().zip(&self.dx))
                    {
                        *tr = xv + alpha * dv;
                    }
                    if let Some(phi) = self.merit(t, &self.trial) {
                        if phi <= phi0 + self.opts.bs_alpha * alpha * slope {
                            return (alpha, shrinks);
                        }
                    }
                    alpha *= self.opts.bs_beta;
                    shrinks += 1;
                    if alpha < 1e-14 {
                        return (0.0, shrinks);
                    }
                }
            }
        }
    }
}

impl PreviewSolver for InteriorPointSolver {
    fn set_parameters(&mut self, p: &Parameters) -> Result<(), SolverError> {
        p.validate(self.n)?;
        self.pp.set(p.t, p.h, p.h0);
        constraints::fill(&mut self.constraints, p.angle, p.lb, p.ub);
        self.zref_x.copy_from_slice(p.zref_x);
        self.zref_y.copy_from_slice(p.zref_y);
        Ok(())
    }

    fn form_init_fp(&mut self, fp_x: &[Float], fp_y: &[Float], init_state: &State) {
        self.pp.seed_trajectory(fp_x, fp_y, init_state, &mut self.x);
    }

    fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        self.objective_log.clear();
        self.outer_iterations = 0;
        self.inner_iterations = 0;
        self.backtracks = 0;

        // The barrier needs strictly positive margins to start from.
        for (ci, c) in self.constraints.iter().enumerate() {
            let v = c.value(&self.x);
            let margin = (v - c.lb).min(c.ub - v);
            if margin <= 0.0 {
                return Err(SolverError::InfeasibleStart {
                    sample: ci / 2,
                    violation: -margin,
                });
            }
        }

        let mut t = self.opts.t0;
        let status = loop {
            self.outer_iterations += 1;

            for _ in 0..self.opts.max_inner.max(1) {
                let decrement = self.newton_direction(t)?;
                self.inner_iterations += 1;
                if decrement <= 2.0 * self.opts.tolerance {
                    break;
                }
                let (alpha, shrinks) = self.line_search(t, -decrement);
                self.backtracks += shrinks;
                if alpha <= 0.0 {
                    break;
                }
                for (xv, dv) in self.x.iter_mut().zip(&self.dx) {
                    *xv += alpha * dv;
                }
                trace!(alpha, decrement, "newton step");
            }

            if self.opts.log_objective {
                self.objective_log.push(objective_value(
                    &self.gains,
                    self.n,
                    &self.zref_x,
                    &self.zref_y,
                    &self.x,
                ));
            }

            // Gap proxy: four one-sided inequalities per sample.
            let gap = 4.0 * self.n as Float / t;
            if gap < self.opts.tol_outer {
                break SolveStatus::Converged {
                    iterations: self.outer_iterations,
                };
            }
            if self.opts.max_outer != 0 && self.outer_iterations >= self.opts.max_outer {
                break SolveStatus::IterationLimit {
                    iterations: self.outer_iterations,
                };
            }
            t *= self.opts.mu;
        };

        debug!(
            outer = self.outer_iterations,
            inner = self.inner_iterations,
            backtracks = self.backtracks,
            converged = status.converged(),
            "interior-point solve finished"
        );
        Ok(status)
    }

    fn solution(&self) -> &[Float] {
        &self.x
    }

    fn next_state(&self) -> State {
        let mut s = [0.0; 6];
        s.copy_from_slice(&self.x[..6]);
        state::tilde_to_orig(self.pp.steps[0].h, &mut s);
        State(s)
    }

    fn next_state_tilde(&self) -> State {
        let mut s = [0.0; 6];
        s.copy_from_slice(&self.x[..6]);
        State(s)
    }

    fn first_control(&self) -> Control {
        Control {
            jerk_x: self.x[6 * self.n],
            jerk_y: self.x[6 * self.n + 1],
        }
    }
}
