//! Structured QP solvers for preview-window walking MPC.
//!
//! Both solvers pose the same quadratic program over a horizon of `N`
//! samples of the linear inverted pendulum: track a reference ZMP while
//! keeping the ZMP inside per-sample rotated support boxes. The decision
//! vector stacks `N` tilde-state blocks of six entries followed by `N`
//! jerk-control blocks of two; no matrix of the problem is ever assembled —
//! every product is expressed over the recurrence sparsity, so a tick costs
//! O(N).
//!
//! Per tick, in order: [`PreviewSolver::set_parameters`],
//! [`PreviewSolver::form_init_fp`], [`PreviewSolver::solve`],
//! [`PreviewSolver::next_state`].

mod active_set;
mod chol;
mod constraints;
mod equality;
mod error;
mod interior_point;
mod params;
mod state;

use smpc_linalg::Float;

pub use active_set::{ActiveSetOptions, ActiveSetSolver};
pub use error::{SolveStatus, SolverError};
pub use interior_point::{InteriorPointOptions, InteriorPointSolver, LineSearch};
pub use params::Gains;
pub use state::{orig_to_tilde, tilde_to_orig, Control, State};

/// Number of entries in one state block of the decision vector.
pub const STATE_BLOCK: usize = 6;
/// Number of entries in one control block of the decision vector.
pub const CONTROL_BLOCK: usize = 2;

/// Borrowed per-tick problem data, laid out as the pattern generator emits
/// it. The solver copies what it needs; the borrow ends with the call.
#[derive(Debug, Clone, Copy)]
pub struct Parameters<'a> {
    /// Sampling periods [s].
    pub t: &'a [Float],
    /// Per-sample `hCoM/g`.
    pub h: &'a [Float],
    /// Height ratio of the incoming state.
    pub h0: Float,
    /// Foot headings [rad].
    pub angle: &'a [Float],
    /// Reference ZMP, world frame.
    pub zref_x: &'a [Float],
    pub zref_y: &'a [Float],
    /// Rotated-frame box bounds, stride 2 per sample.
    pub lb: &'a [Float],
    pub ub: &'a [Float],
}

impl Parameters<'_> {
    fn validate(&self, n: usize) -> Result<(), SolverError> {
        for (name, len, expected) in [
            ("t", self.t.len(), n),
            ("h", self.h.len(), n),
            ("angle", self.angle.len(), n),
            ("zref_x", self.zref_x.len(), n),
            ("zref_y", self.zref_y.len(), n),
            ("lb", self.lb.len(), 2 * n),
            ("ub", self.ub.len(), 2 * n),
        ] {
            if len != expected {
                return Err(SolverError::HorizonLength {
                    name,
                    got: len,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// The capability set shared by the two inner solvers; the walking loop
/// talks to either through this trait.
pub trait PreviewSolver {
    /// Refresh the problem for the tick.
    fn set_parameters(&mut self, p: &Parameters) -> Result<(), SolverError>;

    /// Build the strictly feasible initial trajectory whose ZMP rides the
    /// footprint centers; `init_state` is in original coordinates.
    fn form_init_fp(&mut self, fp_x: &[Float], fp_y: &[Float], init_state: &State);

    /// Run the inner solver on the current trajectory.
    fn solve(&mut self) -> Result<SolveStatus, SolverError>;

    /// The full decision vector: `N` state blocks, then `N` control blocks.
    fn solution(&self) -> &[Float];

    /// First predicted state, back in original coordinates.
    fn next_state(&self) -> State;

    /// First predicted state in tilde coordinates (position entries are the
    /// ZMP).
    fn next_state_tilde(&self) -> State;

    /// First control sample of the optimal trajectory.
    fn first_control(&self) -> Control;
}
