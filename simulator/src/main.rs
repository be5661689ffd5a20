//! # Simulator
//!
//! Generates synthetic trace files for the Trace to Responses component. Each ROI group of
//! the simulation file describes a resting fluorescence, additive noise and the evoked
//! transients, from which one trace file is written per trial.
mod simulation;
mod simulation_elements;

use clap::Parser;
use evoked_common::{TracerOptions, init_tracer};
use miette::IntoDiagnostic;
use simulation::Simulation;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(author, version = evoked_common::version!(), about)]
struct Cli {
    /// Path to the JSON simulation file
    #[clap(long)]
    file: PathBuf,

    /// Directory in which the trace files are written
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,

    /// Trace files are named `<prefix>-<trial>.json`
    #[clap(long, default_value = "trial")]
    file_prefix: String,

    /// Log filter directives used when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    log_directives: String,
}

fn main() -> miette::Result<()> {
    let args = Cli::parse();

    let tracer = init_tracer!(TracerOptions::new(&args.log_directives, false));

    let simulation = Simulation::from_path(&args.file).into_diagnostic()?;
    std::fs::create_dir_all(&args.output_dir).into_diagnostic()?;

    for trial in 0..simulation.trials {
        let path = args
            .output_dir
            .join(format!("{}-{trial}.json", args.file_prefix));
        simulation
            .generate_trial(trial)
            .into_diagnostic()?
            .write_to(&path)
            .into_diagnostic()?;
        info!("{} wrote {}", tracer.service_name(), path.display());
    }
    Ok(())
}
