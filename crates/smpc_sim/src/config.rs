//! Scenario files: the footstep plan plus solver settings, in TOML.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use smpc_gait::{PatternConfig, PatternGenerator, Side, Support};
use smpc_geometry::Footprint;
use smpc_solver::{
    ActiveSetOptions, ActiveSetSolver, Gains, InteriorPointOptions, InteriorPointSolver,
    PreviewSolver,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SolverChoice {
    #[default]
    ActiveSet,
    InteriorPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepSide {
    Left,
    Right,
    Double,
}

impl From<StepSide> for Support {
    fn from(side: StepSide) -> Self {
        match side {
            StepSide::Left => Self::Single(Side::Left),
            StepSide::Right => Self::Single(Side::Right),
            StepSide::Double => Self::Double,
        }
    }
}

/// One `add_footstep` call. Omitted counts and bounds reuse the sticky
/// defaults, exactly like the generator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FootstepSpec {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub ss_samples: Option<usize>,
    #[serde(default)]
    pub total_samples: Option<usize>,
    /// `(forward, left, back, right)` half-widths.
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
    #[serde(default)]
    pub side: Option<StepSide>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Scenario {
    pub pattern: PatternConfig,
    pub gains: Gains,
    pub solver: SolverChoice,
    pub active_set: ActiveSetOptions,
    pub interior_point: InteriorPointOptions,
    /// `(x, ẋ, ẍ, y, ẏ, ÿ)` of the CoM at start.
    pub initial_state: [f64; 6],
    pub footsteps: Vec<FootstepSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn build_pattern(&self) -> PatternGenerator {
        let mut pg = PatternGenerator::new(&self.pattern);
        for step in &self.footsteps {
            let side = step.side.map(Support::from);
            match (step.bounds, step.ss_samples, step.total_samples) {
                (Some(d), Some(ss), total) => pg.add_footstep_with_bounds(
                    step.x,
                    step.y,
                    step.angle,
                    ss,
                    total.unwrap_or(ss),
                    Footprint::new(d[0], d[1], d[2], d[3]),
                    side,
                ),
                (None, Some(ss), total) => pg.add_footstep_with(
                    step.x,
                    step.y,
                    step.angle,
                    ss,
                    total.unwrap_or(ss),
                    side,
                ),
                _ => pg.add_footstep(step.x, step.y, step.angle, side),
            }
        }
        pg
    }

    pub fn build_solver(
        &self,
        choice: Option<SolverChoice>,
    ) -> anyhow::Result<Box<dyn PreviewSolver>> {
        let n = self.pattern.preview_len;
        Ok(match choice.unwrap_or(self.solver) {
            SolverChoice::ActiveSet => {
                Box::new(ActiveSetSolver::new(n, self.gains, self.active_set)?)
            }
            SolverChoice::InteriorPoint => {
                Box::new(InteriorPointSolver::new(n, self.gains, self.interior_point)?)
            }
        })
    }
}

impl Default for Scenario {
    /// The straight reference walk: an initial double support, a step in
    /// place, eight turning strides, a long stride and a closing step.
    fn default() -> Self {
        let turn = 5.0_f64.to_radians();
        let mut footsteps = vec![
            FootstepSpec {
                x: 0.0,
                y: 0.05,
                angle: 0.0,
                ss_samples: Some(3),
                total_samples: Some(3),
                bounds: Some([0.09, 0.025, 0.03, 0.075]),
                side: None,
            },
            FootstepSpec {
                x: 0.0,
                y: -0.1,
                angle: 0.0,
                ss_samples: Some(4),
                total_samples: Some(4),
                bounds: Some([0.09, 0.025, 0.03, 0.025]),
                side: None,
            },
        ];
        for k in 0..8 {
            footsteps.push(FootstepSpec {
                x: 0.035,
                y: if k % 2 == 0 { 0.1 } else { -0.1 },
                angle: turn,
                ss_samples: None,
                total_samples: None,
                bounds: None,
                side: None,
            });
        }
        footsteps.push(FootstepSpec {
            x: 0.035,
            y: 0.1,
            angle: 0.0,
            ss_samples: Some(30),
            total_samples: Some(30),
            bounds: None,
            side: None,
        });
        footsteps.push(FootstepSpec {
            x: 0.0,
            y: -0.1,
            angle: 0.0,
            ss_samples: None,
            total_samples: None,
            bounds: None,
            side: None,
        });

        Self {
            pattern: PatternConfig::default(),
            gains: Gains::default(),
            solver: SolverChoice::default(),
            active_set: ActiveSetOptions::default(),
            interior_point: InteriorPointOptions::default(),
            initial_state: [0.0; 6],
            footsteps,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_scenario_roundtrips_through_toml() {
        let scenario = Scenario::default();
        let text = toml::to_string(&scenario).expect("scenario serializes");
        let back: Scenario = toml::from_str(&text).expect("scenario parses back");
        assert_eq!(back.footsteps.len(), scenario.footsteps.len());
        assert_eq!(back.pattern.preview_len, 15);
    }

    #[test]
    fn default_scenario_builds_the_reference_plan() {
        let pg = Scenario::default().build_pattern();
        assert_eq!(pg.steps().len(), 12);
        let total: usize = pg.steps().iter().map(|s| s.repeat_times).sum();
        assert_eq!(total, 99);
    }

    #[test]
    fn sparse_scenario_relies_on_defaults() {
        let text = r#"
            [[footsteps]]
            x = 0.0
            y = 0.05

            [[footsteps]]
            x = 0.0
            y = -0.1
            ss-samples = 4
        "#;
        let scenario: Scenario = toml::from_str(text).expect("minimal scenario parses");
        assert_eq!(scenario.footsteps.len(), 2);
        let pg = scenario.build_pattern();
        assert_eq!(pg.steps().len(), 2);
        assert_eq!(pg.steps()[1].repeat_times, 4);
    }
}
