use smpc_linalg::{block3::NonPositivePivot, Float};

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum SolverError {
    /// A horizon slice does not match the preview length the solver was
    /// built for.
    #[error("horizon slice `{name}` has length {got}, expected {expected}")]
    HorizonLength {
        name: &'static str,
        got: usize,
        expected: usize,
    },

    /// All objective gains must be strictly positive; they are what keeps
    /// the Schur complement positive definite.
    #[error("objective gain `{name}` must be strictly positive, got {value}")]
    NonPositiveGain { name: &'static str, value: Float },

    /// The point handed to `solve` violates a support box. Does not occur
    /// for trajectories built by `form_init_fp` from boxes that contain
    /// their reference points.
    #[error("initial point violates the support box of sample {sample} by {violation:.3e}")]
    InfeasibleStart { sample: usize, violation: Float },

    /// Non-positive pivot while factorizing; with strictly positive gains
    /// this indicates corrupted inputs (NaN periods, wildly inconsistent
    /// heights) rather than an expected numerical state.
    #[error("Cholesky breakdown in block {block}")]
    NumericBreakdown {
        block: usize,
        #[source]
        source: NonPositivePivot,
    },
}

/// How an inner solver finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SolveStatus {
    Converged { iterations: usize },
    /// An iteration cap was hit; the current (possibly sub-optimal)
    /// trajectory is kept and the caller decides whether to use it.
    IterationLimit { iterations: usize },
}

impl SolveStatus {
    #[must_use]
    pub const fn iterations(self) -> usize {
        match self {
            Self::Converged { iterations } | Self::IterationLimit { iterations } => iterations,
        }
    }

    #[must_use]
    pub const fn converged(self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}
