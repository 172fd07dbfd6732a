//! Planar geometry used by the walking pattern generator: points, cached
//! rotations and the rectangular footprint descriptors that become the ZMP
//! support boxes.

use serde::{Deserialize, Serialize};

/// A point (or displacement) in the ground plane.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: (1.0 - t) * self.x + t * other.x,
            y: (1.0 - t) * self.y + t * other.y,
        }
    }
}

/// A planar rotation with cached `cos`/`sin`.
///
/// Footsteps keep one of these next to their angle so that per-sample
/// constraint rotation never re-evaluates trigonometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation2 {
    pub cos: f64,
    pub sin: f64,
}

impl Rotation2 {
    pub const IDENTITY: Self = Self { cos: 1.0, sin: 0.0 };

    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { cos, sin }
    }

    /// Rotate counter-clockwise by the stored angle.
    #[inline]
    #[must_use]
    pub fn apply(self, p: Point2) -> Point2 {
        Point2 {
            x: self.cos * p.x - self.sin * p.y,
            y: self.sin * p.x + self.cos * p.y,
        }
    }

    /// Rotate by the negated angle (the transpose).
    #[inline]
    #[must_use]
    pub fn apply_inverse(self, p: Point2) -> Point2 {
        Point2 {
            x: self.cos * p.x + self.sin * p.y,
            y: -self.sin * p.x + self.cos * p.y,
        }
    }
}

/// Rectangular footprint half-widths in the foot frame.
///
/// `forward`/`back` bound the foot along its +x/−x axis, `left`/`right`
/// along +y/−y. All four are non-negative lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub forward: f64,
    pub left: f64,
    pub back: f64,
    pub right: f64,
}

impl Footprint {
    #[must_use]
    pub const fn new(forward: f64, left: f64, back: f64, right: f64) -> Self {
        Self { forward, left, back, right }
    }

    /// Foot-frame x interval `[-back, forward]`.
    #[inline]
    #[must_use]
    pub const fn x_range(&self) -> (f64, f64) {
        (-self.back, self.forward)
    }

    /// Foot-frame y interval `[-right, left]`.
    #[inline]
    #[must_use]
    pub const fn y_range(&self) -> (f64, f64) {
        (-self.right, self.left)
    }

    /// World-frame corners, counter-clockwise starting from front-left.
    #[must_use]
    pub fn vertices(&self, rotation: Rotation2, center: Point2) -> [Point2; 4] {
        [
            Point2::new(self.forward, self.left),
            Point2::new(-self.back, self.left),
            Point2::new(-self.back, -self.right),
            Point2::new(self.forward, -self.right),
        ]
        .map(|corner| center + rotation.apply(corner))
    }
}

/// Cartesian foot position plus its heading, as handed to leg kinematics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub angle: f64,
}
