use std::io;

use smpc_geometry::{FootPose, Footprint, Point2, Rotation2};
use tracing::{debug, trace};

use crate::{
    footstep::{Footstep, Side, Support},
    Horizon, PatternConfig, PlanError, PreviewStatus,
};

/// Builds the footstep plan and drives the preview window over it.
///
/// Footsteps are appended relative to the previous one; double-support
/// phases between two single supports are synthesized automatically. Bounds
/// and repeat counts are sticky: variants of [`add_footstep`] that omit them
/// reuse the most recently supplied values.
///
/// [`add_footstep`]: Self::add_footstep
pub struct PatternGenerator {
    steps: Vec<Footstep>,
    /// Index of the record owning the first sample of the preview window.
    current_step: usize,
    horizon: Horizon,
    step_height: f64,

    default_bounds: Footprint,
    default_repeat: usize,
    default_ds_count: usize,
    default_ds_bounds: Footprint,
}

impl PatternGenerator {
    #[must_use]
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            steps: Vec::new(),
            current_step: 0,
            horizon: Horizon::new(
                config.preview_len,
                config.sampling_period.get(),
                config.height_ratio(),
            ),
            step_height: config.step_height.get(),
            default_bounds: Footprint::new(0.09, 0.025, 0.03, 0.025),
            default_repeat: 4,
            default_ds_count: 0,
            default_ds_bounds: Footprint::new(0.07, 0.025, 0.025, 0.025),
        }
    }

    /// The plan records, in insertion order.
    #[must_use]
    pub fn steps(&self) -> &[Footstep] {
        &self.steps
    }

    /// Index of the record at the start of the preview window.
    #[must_use]
    pub const fn current_step(&self) -> usize {
        self.current_step
    }

    #[must_use]
    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    /// Mutable access to the horizon buffers, for callers that vary the
    /// sampling periods between ticks.
    pub fn horizon_mut(&mut self) -> &mut Horizon {
        &mut self.horizon
    }

    /// Append a footstep reusing the sticky bounds and repeat counts.
    ///
    /// `(x_offset, y_offset)` are measured in the previous step's foot frame
    /// and `angle_offset` is added to its heading; for the very first record
    /// they are absolute. `side = None` alternates feet automatically (the
    /// first automatic step is a right support, and the first record of an
    /// empty plan becomes a double support).
    pub fn add_footstep(
        &mut self,
        x_offset: f64,
        y_offset: f64,
        angle_offset: f64,
        side: Option<Support>,
    ) {
        let ds_count = self.default_ds_count;
        self.push_footstep(x_offset, y_offset, angle_offset, ds_count, side);
    }

    /// Append a footstep with explicit sample counts: `ss_samples` in single
    /// support and `total_samples - ss_samples` synthesized double-support
    /// phases. The counts become the new sticky defaults.
    pub fn add_footstep_with(
        &mut self,
        x_offset: f64,
        y_offset: f64,
        angle_offset: f64,
        ss_samples: usize,
        total_samples: usize,
        side: Option<Support>,
    ) {
        self.default_repeat = ss_samples;
        self.default_ds_count = total_samples.saturating_sub(ss_samples);
        self.add_footstep(x_offset, y_offset, angle_offset, side);
    }

    /// Append a footstep with explicit sample counts and support bounds; all
    /// of them become the new sticky defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn add_footstep_with_bounds(
        &mut self,
        x_offset: f64,
        y_offset: f64,
        angle_offset: f64,
        ss_samples: usize,
        total_samples: usize,
        bounds: Footprint,
        side: Option<Support>,
    ) {
        self.default_bounds = bounds;
        self.add_footstep_with(
            x_offset,
            y_offset,
            angle_offset,
            ss_samples,
            total_samples,
            side,
        );
    }

    fn push_footstep(
        &mut self,
        x_offset: f64,
        y_offset: f64,
        angle_offset: f64,
        ds_count: usize,
        side: Option<Support>,
    ) {
        // The reference ZMP sits at the center of the foot-frame x interval
        // and on the foot axis in y.
        let zmp_offset = Point2::new(
            (self.default_bounds.forward - self.default_bounds.back) / 2.0,
            0.0,
        );

        let Some(prev) = self.steps.last() else {
            // First ("virtual") record: absolute pose, double support unless
            // the caller insists otherwise.
            let support = side.unwrap_or(Support::Double);
            let position = Point2::new(x_offset, y_offset);
            let rotation = Rotation2::from_angle(angle_offset);
            let zmp_ref = position + rotation.apply(zmp_offset);
            self.steps.push(Footstep::new(
                support,
                position,
                angle_offset,
                zmp_ref,
                self.default_bounds,
                self.default_repeat,
            ));
            return;
        };

        let support = side.unwrap_or(match prev.support {
            Support::Single(s) => Support::Single(s.opposite()),
            Support::Double => Support::Single(Side::Right),
        });

        let prev_position = prev.position;
        let prev_angle = prev.angle;
        let next_position = prev_position + prev.rotation.apply(Point2::new(x_offset, y_offset));
        let next_angle = prev_angle + angle_offset;
        let next_zmp = next_position + Rotation2::from_angle(next_angle).apply(zmp_offset);

        // Double supports between the previous and the new single support:
        // pose interpolated linearly, the earlier half referencing the
        // previous ZMP and the later half the new one.
        for i in 0..ds_count {
            let t = (i + 1) as f64 / (ds_count + 1) as f64;
            let zmp_ref = if i < ds_count / 2 {
                self.steps.last().map_or(next_zmp, |s| s.zmp_ref)
            } else {
                next_zmp
            };
            self.steps.push(Footstep::new(
                Support::Double,
                prev_position.lerp(next_position, t),
                prev_angle + angle_offset * t,
                zmp_ref,
                self.default_ds_bounds,
                1,
            ));
        }

        self.steps.push(Footstep::new(
            support,
            next_position,
            next_angle,
            next_zmp,
            self.default_bounds,
            self.default_repeat,
        ));
    }

    /// Fill the horizon arrays with the next `N` samples of the plan.
    ///
    /// Each record contributes as many samples as its `repeat_counter`
    /// allows; afterwards the cursor record's counter is decremented once
    /// and the cursor advances whenever a counter reaches zero. Returns
    /// [`PreviewStatus::Halt`] when the plan is exhausted before the window
    /// is complete (and on every later call).
    pub fn form_preview_window(&mut self) -> PreviewStatus {
        let n = self.horizon.len();
        if self.current_step >= self.steps.len() {
            debug!(step = self.current_step, "footstep plan exhausted");
            return PreviewStatus::Halt;
        }

        let mut status = PreviewStatus::Ok;
        let mut win = self.current_step;
        let mut remaining = self.steps[win].repeat_counter;
        let mut i = 0;
        while i < n {
            if remaining > 0 {
                self.emit_sample(i, win);
                remaining -= 1;
                i += 1;
            } else {
                win += 1;
                if win == self.steps.len() {
                    debug!(samples = i, "plan too short for a full preview window");
                    status = PreviewStatus::Halt;
                    break;
                }
                remaining = self.steps[win].repeat_counter;
            }
        }

        if self.steps[self.current_step].repeat_counter == 0 {
            self.current_step += 1;
        }
        if let Some(step) = self.steps.get_mut(self.current_step) {
            step.repeat_counter = step.repeat_counter.saturating_sub(1);
            if step.repeat_counter == 0 {
                trace!(step = self.current_step, "support phase consumed");
                self.current_step += 1;
            }
        }

        status
    }

    fn emit_sample(&mut self, i: usize, step_index: usize) {
        let step = &self.steps[step_index];
        let hor = &mut self.horizon;

        hor.angle[i] = step.angle;
        hor.fp_x[i] = step.position.x;
        hor.fp_y[i] = step.position.y;
        hor.zref_x[i] = step.zmp_ref.x;
        hor.zref_y[i] = step.zmp_ref.y;

        // Box bounds on the rotated ZMP, re-centered on the footprint.
        let center = step.rotation.apply_inverse(step.position);
        let (x_lo, x_hi) = step.footprint.x_range();
        let (y_lo, y_hi) = step.footprint.y_range();
        hor.lb[2 * i] = center.x + x_lo;
        hor.ub[2 * i] = center.x + x_hi;
        hor.lb[2 * i + 1] = center.y + y_lo;
        hor.ub[2 * i + 1] = center.y + y_hi;
    }

    /// True when the walking controller must swap the support foot: at the
    /// central sample of a double support separating two single supports,
    /// and whenever two adjacent single supports differ in side.
    #[must_use]
    pub fn is_support_switch_needed(&self) -> bool {
        if self.current_step == 0 {
            return false;
        }
        let Some(cur) = self.steps.get(self.current_step) else {
            return false;
        };
        let prev = &self.steps[self.current_step - 1];
        match (prev.support, cur.support) {
            (Support::Single(_), Support::Double) => {
                cur.repeat_counter == cur.repeat_times % 2
            }
            (Support::Single(a), Support::Single(b)) => a != b,
            _ => false,
        }
    }

    /// Feet poses for the control loop, `(left, right)`.
    ///
    /// During double support both feet rest on their bracketing single
    /// supports. During single support the support foot is pinned and the
    /// swing foot travels along the segment joining its previous and next
    /// single-support poses, with height following a parabola over arc
    /// length whose apex is the configured step height.
    ///
    /// `loops_per_preview_iter` is the number of control loops per preview
    /// sample and `loops_in_current_preview` the number already run within
    /// the current sample; call after [`form_preview_window`].
    ///
    /// [`form_preview_window`]: Self::form_preview_window
    pub fn feet_positions(
        &self,
        loops_per_preview_iter: usize,
        loops_in_current_preview: usize,
    ) -> Result<(FootPose, FootPose), PlanError> {
        let cur = self
            .steps
            .get(self.current_step)
            .ok_or(PlanError::PlanExhausted)?;

        match cur.support {
            Support::Double => {
                let next = self
                    .next_single(self.current_step, None)
                    .ok_or(PlanError::MissingSingleSupport)?;
                let prev = self
                    .prev_single(self.current_step, None)
                    .ok_or(PlanError::MissingSingleSupport)?;
                let (left, right) = match self.steps[next].support {
                    Support::Single(Side::Left) => (next, prev),
                    _ => (prev, next),
                };
                Ok((self.grounded_pose(left), self.grounded_pose(right)))
            }
            Support::Single(side) => {
                let swing_side = side.opposite();
                let prev = self
                    .prev_single(self.current_step, Some(swing_side))
                    .ok_or(PlanError::MissingSingleSupport)?;
                let next = self
                    .next_single(self.current_step, Some(swing_side))
                    .ok_or(PlanError::MissingSingleSupport)?;

                let passed = cur.repeat_times - cur.repeat_counter.min(cur.repeat_times);
                let theta = (loops_per_preview_iter * passed + loops_in_current_preview) as f64
                    / (loops_per_preview_iter * cur.repeat_times) as f64;

                let from = self.steps[prev].position;
                let to = self.steps[next].position;
                let p = from.lerp(to, theta);
                let swing = FootPose {
                    x: p.x,
                    y: p.y,
                    // Parabola over arc length: 0 at both ends, apex equal to
                    // the step height halfway along the segment.
                    z: 4.0 * self.step_height * theta * (1.0 - theta),
                    angle: self.steps[next].angle,
                };
                let support = self.grounded_pose(self.current_step);
                Ok(match side {
                    Side::Left => (support, swing),
                    Side::Right => (swing, support),
                })
            }
        }
    }

    fn grounded_pose(&self, index: usize) -> FootPose {
        let step = &self.steps[index];
        FootPose {
            x: step.position.x,
            y: step.position.y,
            z: 0.0,
            angle: step.angle,
        }
    }

    fn next_single(&self, start: usize, side: Option<Side>) -> Option<usize> {
        self.steps
            .iter()
            .enumerate()
            .skip(start + 1)
            .find_map(|(i, s)| match s.support {
                Support::Single(fs) if side.map_or(true, |want| want == fs) => Some(i),
                _ => None,
            })
    }

    fn prev_single(&self, start: usize, side: Option<Side>) -> Option<usize> {
        self.steps[..start]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, s)| match s.support {
                Support::Single(fs) if side.map_or(true, |want| want == fs) => Some(i),
                _ => None,
            })
    }

    /// Positions and headings of the single-support steps, for plotting and
    /// higher-level planners.
    #[must_use]
    pub fn single_support_poses(&self) -> Vec<(Point2, f64)> {
        self.steps
            .iter()
            .filter(|s| s.support.is_single())
            .map(|s| (s.position, s.angle))
            .collect()
    }

    /// Dump the plan as a textual sequence of records.
    pub fn write_plan<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# walking plan: {} records", self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            let kind = match step.support {
                Support::Single(Side::Left) => "ss-left",
                Support::Single(Side::Right) => "ss-right",
                Support::Double => "ds",
            };
            writeln!(
                w,
                "record {i:3} {kind:8} angle {:+.6} position ({:+.6}, {:+.6}) \
                 zmp ({:+.6}, {:+.6}) span [{:.3} {:.3} {:.3} {:.3}] samples {}",
                step.angle,
                step.position.x,
                step.position.y,
                step.zmp_ref.x,
                step.zmp_ref.y,
                step.footprint.forward,
                step.footprint.left,
                step.footprint.back,
                step.footprint.right,
                step.repeat_times,
            )?;
            let verts = step.footprint.vertices(step.rotation, step.position);
            write!(w, "    polygon")?;
            for v in verts {
                write!(w, " ({:+.6}, {:+.6})", v.x, v.y)?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}
