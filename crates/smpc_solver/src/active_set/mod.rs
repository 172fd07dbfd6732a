//! Primal feasible active-set solver.
//!
//! Starting from the strictly feasible seed trajectory, the unconstrained
//! equality-projected descent direction is computed through the Schur
//! factor; walking along it, the first violated support box is activated
//! and the augmented factor is updated incrementally. Constraints whose
//! Lagrange multiplier turns negative are dropped again through a Givens
//! downdate. Termination: a full step with no negative multiplier.

mod factor;

use serde::{Deserialize, Serialize};
use smpc_linalg::Float;
use tracing::{debug, trace};

use crate::{
    constraints::{self, BoxConstraint},
    chol::SchurFactor,
    equality::{form_ex, form_i2h_etx, InvHessian},
    error::{SolveStatus, SolverError},
    params::{Gains, ProblemParams},
    state::{self, Control, State},
    Parameters, PreviewSolver,
};

use factor::ConstraintFactor;

/// One activated inequality. The coefficients are sign-folded at
/// activation so that the optimal multiplier is non-negative.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveConstraint {
    /// Index into the 2N-entry constraint table.
    pub cind: usize,
    /// Decision-vector index of the sample's `z_x` entry.
    pub ind: usize,
    pub coef_x: Float,
    pub coef_y: Float,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ActiveSetOptions {
    /// Feasibility and multiplier tolerance.
    pub tolerance: Float,
    /// Cap on activated constraints; 0 means unlimited.
    pub max_activated: usize,
    /// Cap on outer iterations; 0 means unlimited.
    pub max_iterations: usize,
    /// Drop constraints with negative multipliers instead of keeping the
    /// first working set that yields a full step.
    pub constraint_removal: bool,
    /// Record the objective value after every step.
    pub log_objective: bool,
}

impl Default for ActiveSetOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_activated: 0,
            max_iterations: 0,
            constraint_removal: true,
            log_objective: false,
        }
    }
}

pub struct ActiveSetSolver {
    n: usize,
    gains: Gains,
    opts: ActiveSetOptions,
    pp: ProblemParams,
    ec: SchurFactor,
    factor: ConstraintFactor,

    constraints: Vec<BoxConstraint>,
    active: Vec<ActiveConstraint>,
    is_active: Vec<bool>,

    x: Vec<Float>,
    dx: Vec<Float>,
    /// `x + H⁻¹g`: the iterate with the reference subtracted from the
    /// tilde-position entries.
    xihg: Vec<Float>,
    s0: Vec<Float>,
    nu: Vec<Float>,
    lambda: Vec<Float>,

    zref_x: Vec<Float>,
    zref_y: Vec<Float>,
    objective_log: Vec<Float>,
}

impl ActiveSetSolver {
    pub fn new(n: usize, gains: Gains, opts: ActiveSetOptions) -> Result<Self, SolverError> {
        let pp = ProblemParams::new(n, &gains)?;
        Ok(Self {
            n,
            gains,
            opts,
            pp,
            ec: SchurFactor::new(n),
            factor: ConstraintFactor::new(n),
            constraints: Vec::with_capacity(2 * n),
            active: Vec::with_capacity(2 * n),
            is_active: vec![false; 2 * n],
            x: vec![0.0; 8 * n],
            dx: vec![0.0; 8 * n],
            xihg: vec![0.0; 8 * n],
            s0: vec![0.0; 6 * n],
            nu: vec![0.0; 6 * n],
            lambda: vec![0.0; 2 * n],
            zref_x: vec![0.0; n],
            zref_y: vec![0.0; n],
            objective_log: Vec::new(),
        })
    }

    /// Number of constraints active at the last solution.
    #[must_use]
    pub fn active_set_size(&self) -> usize {
        self.active.len()
    }

    /// Objective values recorded during the last solve (empty unless
    /// enabled in the options).
    #[must_use]
    pub fn objective_log(&self) -> &[Float] {
        &self.objective_log
    }

    fn refresh_xihg(&mut self) {
        self.xihg.copy_from_slice(&self.x);
        for i in 0..self.n {
            self.xihg[6 * i] -= self.zref_x[i];
            self.xihg[6 * i + 3] -= self.zref_y[i];
        }
    }

    /// Descent direction for the current working set:
    /// `dx = −(x + H⁻¹g) − H⁻¹Eᵀν − H⁻¹A_Wᵀλ`.
    fn resolve(&mut self) {
        let m = self.active.len();
        self.factor
            .solve_multipliers(&self.ec, &mut self.nu, &mut self.lambda[..m]);

        let inv = InvHessian::uniform(&self.pp);
        form_i2h_etx(&self.pp, &inv, &self.nu, &mut self.dx);
        for (d, xg) in self.dx.iter_mut().zip(&self.xihg) {
            *d = -*xg - *d;
        }
        let i2h = self.pp.i2q[0];
        for (j, ac) in self.active.iter().enumerate() {
            let lj = self.lambda[j];
            self.dx[ac.ind] -= i2h * lj * ac.coef_x;
            self.dx[ac.ind + 3] -= i2h * lj * ac.coef_y;
        }
    }

    /// Largest feasible step along `dx` and the first box it hits.
    fn blocking_constraint(&self) -> (Float, Option<(usize, bool)>) {
        let mut alpha: Float = 1.0;
        let mut hit = None;
        for (ci, c) in self.constraints.iter().enumerate() {
            if self.is_active[ci] {
                continue;
            }
            let v = c.value(&self.x);
            let dv = c.direction(&self.dx);
            if dv > Float::EPSILON {
                if v + alpha * dv > c.ub {
                    alpha = ((c.ub - v) / dv).max(0.0);
                    hit = Some((ci, true));
                }
            } else if dv < -Float::EPSILON && v + alpha * dv < c.lb {
                alpha = ((c.lb - v) / dv).max(0.0);
                hit = Some((ci, false));
            }
        }
        (alpha, hit)
    }

    fn objective(&self) -> Float {
        crate::params::objective_value(&self.gains, self.n, &self.zref_x, &self.zref_y, &self.x)
    }
}

impl PreviewSolver for ActiveSetSolver {
    fn set_parameters(&mut self, p: &Parameters) -> Result<(), SolverError> {
        p.validate(self.n)?;
        self.pp.set(p.t, p.h, p.h0);
        constraints::fill(&mut self.constraints, p.angle, p.lb, p.ub);
        self.zref_x.copy_from_slice(p.zref_x);
        self.zref_y.copy_from_slice(p.zref_y);
        let inv = InvHessian::uniform(&self.pp);
        self.ec.form(&self.pp, &inv, 0)
    }

    fn form_init_fp(&mut self, fp_x: &[Float], fp_y: &[Float], init_state: &State) {
        self.pp.seed_trajectory(fp_x, fp_y, init_state, &mut self.x);
    }

    fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        let tol = self.opts.tolerance;
        self.active.clear();
        self.is_active.fill(false);
        self.objective_log.clear();

        constraints::check_feasible(&self.constraints, &self.x, tol)?;
        self.refresh_xihg();

        form_ex(&self.pp, &self.xihg, &mut self.s0);
        for v in &mut self.s0 {
            *v = -*v;
        }
        self.ec.solve_forward(&mut self.s0, 0, 0);
        self.ec.solve_forward(&mut self.s0, 1, 0);
        self.factor.reset(&self.s0);
        self.resolve();

        let mut iterations = 0;
        let status = loop {
            iterations += 1;
            let (alpha, hit) = self.blocking_constraint();

            for (x, d) in self.x.iter_mut().zip(&self.dx) {
                *x += alpha * d;
            }
            for (xg, d) in self.xihg.iter_mut().zip(&self.dx) {
                *xg += alpha * d;
            }
            if self.opts.log_objective {
                self.objective_log.push(self.objective());
            }

            if let Some((cind, at_upper)) = hit {
                if self.opts.max_activated != 0 && self.active.len() >= self.opts.max_activated {
                    break SolveStatus::IterationLimit { iterations };
                }
                let def = self.constraints[cind];
                let sign = if at_upper { 1.0 } else { -1.0 };
                let ac = ActiveConstraint {
                    cind,
                    ind: def.ind,
                    coef_x: sign * def.coef_x,
                    coef_y: sign * def.coef_y,
                };
                let rhs_tail =
                    -(ac.coef_x * self.xihg[ac.ind] + ac.coef_y * self.xihg[ac.ind + 3]);
                trace!(cind, at_upper, alpha, "activating constraint");
                self.factor
                    .add_row(&self.pp, &self.ec, &self.active, &ac, rhs_tail)?;
                self.is_active[cind] = true;
                self.active.push(ac);
                self.resolve();
            } else if self.opts.constraint_removal && !self.active.is_empty() {
                let m = self.active.len();
                self.factor
                    .solve_multipliers(&self.ec, &mut self.nu, &mut self.lambda[..m]);
                let (k_min, lambda_min) = self
                    .lambda[..m]
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, Float::INFINITY), |acc, (k, l)| {
                        if l < acc.1 {
                            (k, l)
                        } else {
                            acc
                        }
                    });
                if lambda_min < -tol {
                    trace!(k_min, lambda_min, "dropping constraint");
                    self.factor.remove_row(k_min);
                    let removed = self.active.remove(k_min);
                    self.is_active[removed.cind] = false;
                    self.resolve();
                } else {
                    break SolveStatus::Converged { iterations };
                }
            } else {
                break SolveStatus::Converged { iterations };
            }

            if self.opts.max_iterations != 0 && iterations >= self.opts.max_iterations {
                break SolveStatus::IterationLimit { iterations };
            }
        };

        debug!(
            iterations = status.iterations(),
            active = self.active.len(),
            converged = status.converged(),
            "active-set solve finished"
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
