//! Walking simulation driver: load a scenario, run the preview-window MPC
//! loop, report per-tick diagnostics.

mod config;
mod runner;

use std::{fs::File, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Scenario, SolverChoice};

#[derive(Debug, Parser)]
#[command(version, about = "Preview-window walking MPC simulation")]
struct Cli {
    /// Scenario TOML; the built-in straight walk runs when omitted.
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Stop after this many control ticks even if the plan continues.
    #[arg(long)]
    max_ticks: Option<usize>,

    /// Override the scenario's solver choice.
    #[arg(long, value_enum)]
    solver: Option<SolverChoice>,

    /// Write the footstep plan dump to this path before walking.
    #[arg(long)]
    dump_plan: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let scenario = match &cli.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default(),
    };

    if let Some(path) = &cli.dump_plan {
        let pg = scenario.build_pattern();
        let mut file = File::create(path)
            .with_context(|| format!("creating plan dump {}", path.display()))?;
        pg.write_plan(&mut file)
            .with_context(|| format!("writing plan dump {}", path.display()))?;
    }

    let summary = runner::run(&scenario, cli.solver, cli.max_ticks)?;
    println!(
        "walked {} ticks; final CoM ({:+.4}, {:+.4}) m, worst solve {} iterations",
        summary.ticks,
        summary.final_state.x(),
        summary.final_state.y(),
        summary.max_iterations,
    );
    Ok(())
}
