//! The per-sample support boxes, as rows over the decision vector.
//!
//! Each sample contributes two inequalities on the rotated tilde position:
//! the x-axis and y-axis of the foot frame. The coefficient pair is a row
//! of the sample's rotation matrix, so `coef_x² + coef_y² = 1`.

use smpc_linalg::Float;

use crate::error::SolverError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxConstraint {
    /// Index of the sample's `z_x` entry in the decision vector; the `z_y`
    /// entry sits three slots later.
    pub ind: usize,
    pub coef_x: Float,
    pub coef_y: Float,
    pub lb: Float,
    pub ub: Float,
}

impl BoxConstraint {
    #[inline]
    pub fn value(&self, x: &[Float]) -> Float {
        self.coef_x * x[self.ind] + self.coef_y * x[self.ind + 3]
    }

    #[inline]
    pub fn direction(&self, dx: &[Float]) -> Float {
        self.coef_x * dx[self.ind] + self.coef_y * dx[self.ind + 3]
    }
}

/// Rebuild the constraint table for the tick.
pub(crate) fn fill(
    table: &mut Vec<BoxConstraint>,
    angle: &[Float],
    lb: &[Float],
    ub: &[Float],
) {
    table.clear();
    for (i, a) in angle.iter().enumerate() {
        let (sin, cos) = a.sin_cos();
        table.push(BoxConstraint {
            ind: 6 * i,
            coef_x: cos,
            coef_y: sin,
            lb: lb[2 * i],
            ub: ub[2 * i],
        });
        table.push(BoxConstraint {
            ind: 6 * i,
            coef_x: -sin,
            coef_y: cos,
            lb: lb[2 * i + 1],
            ub: ub[2 * i + 1],
        });
    }
}

/// Verify the point honors every box within `tol`.
pub(crate) fn check_feasible(
    table: &[BoxConstraint],
    x: &[Float],
    tol: Float,
) -> Result<(), SolverError> {
    for (ci, c) in table.iter().enumerate() {
        let v = c.value(x);
        let violation = (c.lb - v).max(v - c.ub);
        if violation > tol {
            return Err(SolverError::InfeasibleStart {
                sample: ci / 2,
                violation,
            });
        }
    }
    Ok(())
}
