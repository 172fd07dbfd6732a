//! Scalar aliases, norms and the small dense kernels shared by the walking
//! MPC solver: 3×3 symmetric Cholesky blocks and Givens rotations.

pub mod block3;

pub mod prelude {
    pub use super::{
        block3, Float, Givens, Matrix, MatrixView, SliceNorm, Vector, VectorView,
    };
}

/// The precision used throughout the solver.
pub type Float = f64;

pub type Vector<T> = ndarray::Array1<T>;
pub type Matrix<T> = ndarray::Array2<T>;
pub type VectorView<'a, T> = ndarray::ArrayView1<'a, T>;
pub type MatrixView<'a, T> = ndarray::ArrayView2<'a, T>;

/// Norms over plain slices. The solver keeps its hot-path buffers as flat
/// slices, so the extension trait lives on `[Float]` rather than on the
/// ndarray types.
pub trait SliceNorm {
    /// Largest absolute entry; zero for an empty slice.
    fn inf_norm(&self) -> Float;
    fn euclidean_norm(&self) -> Float;
}

impl SliceNorm for [Float] {
    fn inf_norm(&self) -> Float {
        self.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }

    fn euclidean_norm(&self) -> Float {
        self.iter().fold(0.0, |acc, x| acc + x * x).sqrt()
    }
}

/// A plane rotation `[c s; -s c]` chosen to zero the second entry of a pair.
///
/// This is the primitive of the Cholesky downdate: after a row is removed
/// from the factor, sweeping the trailing block with these rotations
/// restores triangularity in place.
#[derive(Debug, Clone, Copy)]
pub struct Givens {
    pub c: Float,
    pub s: Float,
}

impl Givens {
    /// Rotation such that `apply(a, b) == (hypot(a, b), 0.0)`.
    ///
    /// The first output is non-negative, which keeps rotated diagonals
    /// positive. For a pair that is already (numerically) zero the identity
    /// rotation is returned.
    #[must_use]
    pub fn zeroing(a: Float, b: Float) -> Self {
        let r = a.hypot(b);
        if r <= Float::EPSILON {
            return Self { c: 1.0, s: 0.0 };
        }
        Self { c: a / r, s: b / r }
    }

    /// Apply the rotation to a pair of column entries.
    #[inline]
    #[must_use]
    pub fn apply(&self, a: Float, b: Float) -> (Float, Float) {
        (self.c * a + self.s * b, -self.s * a + self.c * b)
    }
}
