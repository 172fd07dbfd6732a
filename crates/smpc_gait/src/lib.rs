//! Walking pattern generation for a preview-window MPC.
//!
//! The pattern generator owns an append-only sequence of footsteps (single
//! and double support phases), derives per-sample ZMP references and support
//! box constraints over the preview horizon, and advances its cursor one
//! control tick at a time. The solver borrows the emitted horizon arrays for
//! the duration of one tick.

mod footstep;
mod horizon;
mod pattern;

use serde::{Deserialize, Serialize};
use typed_floats::StrictlyPositiveFinite;

pub use footstep::{Footstep, Side, Support};
pub use horizon::Horizon;
pub use pattern::PatternGenerator;

/// Outcome of filling the preview window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PreviewStatus {
    /// The horizon arrays hold `N` fresh samples.
    Ok,
    /// The plan ran out before the window was filled; the walk must stop.
    Halt,
}

impl PreviewStatus {
    #[inline]
    pub const fn is_halt(self) -> bool {
        matches!(self, Self::Halt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("the preview cursor has run past the end of the footstep plan")]
    PlanExhausted,
    /// The current phase has no bracketing single support on the swing side,
    /// which happens when the plan does not start and end with single
    /// supports.
    #[error("no bracketing single-support step for the current phase")]
    MissingSingleSupport,
}

/// Static parameters of the pattern generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PatternConfig {
    /// Number of samples in the preview window.
    pub preview_len: usize,
    /// Sampling period of one preview sample [s].
    pub sampling_period: StrictlyPositiveFinite<f64>,
    /// Height of the CoM above the ground [m].
    pub com_height: StrictlyPositiveFinite<f64>,
    /// Apex height of the swing foot [m].
    pub step_height: StrictlyPositiveFinite<f64>,
    /// Gravitational acceleration [m/s^2].
    pub gravity: StrictlyPositiveFinite<f64>,
}

impl PatternConfig {
    /// `h = hCoM / g`, the constant tying CoM acceleration to the ZMP.
    #[must_use]
    pub fn height_ratio(&self) -> f64 {
        self.com_height.get() / self.gravity.get()
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            preview_len: 15,
            sampling_period: 0.1.try_into().expect("0.1 > 0.0"),
            com_height: 0.261.try_into().expect("0.261 > 0.0"),
            step_height: 0.0135.try_into().expect("0.0135 > 0.0"),
            gravity: 9.81.try_into().expect("9.81 > 0.0"),
        }
    }
}
