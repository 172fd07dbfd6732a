use smpc_geometry::{Footprint, Point2, Rotation2};

/// Which foot carries the weight during single support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Support phase of one plan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    Single(Side),
    Double,
}

impl Support {
    #[inline]
    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::Single(_))
    }
}

/// One entry of the footstep plan.
///
/// Records are appended once and never reordered; only `repeat_counter`
/// mutates as the preview cursor walks over them.
#[derive(Debug, Clone)]
pub struct Footstep {
    pub support: Support,
    /// Absolute footprint center in the world frame.
    pub position: Point2,
    /// Absolute heading [rad].
    pub angle: f64,
    /// Cached `cos`/`sin` of `angle`.
    pub rotation: Rotation2,
    /// Absolute reference ZMP for samples owned by this record.
    pub zmp_ref: Point2,
    /// Support-box half-widths in the foot frame.
    pub footprint: Footprint,
    /// How many preview samples this phase covers in total.
    pub repeat_times: usize,
    /// How many samples are still left to emit.
    pub repeat_counter: usize,
}

impl Footstep {
    #[must_use]
    pub fn new(
        support: Support,
        position: Point2,
        angle: f64,
        zmp_ref: Point2,
        footprint: Footprint,
        repeat_times: usize,
    ) -> Self {
        Self {
            support,
            position,
            angle,
            rotation: Rotation2::from_angle(angle),
            zmp_ref,
            footprint,
            repeat_times,
            repeat_counter: repeat_times,
        }
    }
}
