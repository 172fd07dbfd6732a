//! The walking loop: preview window, solve, advance.

use smpc_solver::{Parameters, PreviewSolver, State};
use tracing::{debug, info};

use crate::config::{Scenario, SolverChoice};

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub ticks: usize,
    pub final_state: State,
    pub max_iterations: usize,
}

/// Walk the scenario until the plan halts or `max_ticks` is reached.
pub fn run(
    scenario: &Scenario,
    solver_override: Option<SolverChoice>,
    max_ticks: Option<usize>,
) -> anyhow::Result<RunSummary> {
    let mut pg = scenario.build_pattern();
    let mut solver = scenario.build_solver(solver_override)?;
    let mut state = State(scenario.initial_state);
    let mut ticks = 0;
    let mut max_iterations = 0;

    loop {
        if max_ticks.is_some_and(|cap| ticks >= cap) {
            break;
        }
        if pg.form_preview_window().is_halt() {
            info!(ticks, "footstep plan exhausted, halting");
            break;
        }

        let hor = pg.horizon();
        solver.set_parameters(&Parameters {
            t: &hor.t,
            h: &hor.h,
            h0: hor.h[0],
            angle: &hor.angle,
            zref_x: &hor.zref_x,
            zref_y: &hor.zref_y,
            lb: &hor.lb,
            ub: &hor.ub,
        })?;
        solver.form_init_fp(&hor.fp_x, &hor.fp_y, &state);
        let status = solver.solve()?;
        max_iterations = max_iterations.max(status.iterations());

        let control = solver.first_control();
        // Integrating the plant with the first control reproduces the first
        // predicted state; the gap is a model-consistency diagnostic.
        let mut plant = state;
        plant.integrate(&control, hor.t[0]);
        state = solver.next_state();

        info!(
            ticks,
            iterations = status.iterations(),
            converged = status.converged(),
            x = state.x(),
            y = state.y(),
            jerk_x = control.jerk_x,
            "tick"
        );
        debug!(
            model_gap_x = (plant.x() - state.x()).abs(),
            model_gap_y = (plant.y() - state.y()).abs(),
            zmp_x = state.x() - hor.h[0] * state.ax(),
            zmp_y = state.y() - hor.h[0] * state.ay(),
            "predicted zmp"
        );
        ticks += 1;
    }

    Ok(RunSummary {
        ticks,
        final_state: state,
        max_iterations,
    })
}
