//! # Trace to Responses
//!
//! The Trace to Responses component performs the following functions:
//! * Reads JSON trace files, each holding the fluorescence traces of many ROIs for one trial.
//! * Normalizes the traces to dF/F, on the accelerator when one is configured and worthwhile.
//! * Classifies every ROI under the user specified stimulation protocol.
//! * For each trace file, writes a JSON report of the retained ROIs, their thresholds and the statistics of the trial.
//!
mod parameters;

use clap::Parser;
use evoked_common::{
    TracerOptions, init_tracer,
    metrics::{
        component_info_metric,
        failures::{self, FailureKind},
        names::{ACCELERATOR_FALLBACKS, FAILURES, FILES_PROCESSED, ROIS_EXCLUDED, ROIS_PASSED},
    },
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use miette::IntoDiagnostic;
use parameters::Mode;
use rayon::prelude::*;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, instrument, warn};
use trace_to_responses::{
    AcceleratorContext, ClassifyError, ConfigError, DetectionConfig, NormalizeError,
    ParallelAccelerator, Protocol, TraceFile, TraceFileError, classify, normalize,
    report::ResponseReport,
};

const BYTES_PER_MIB: u64 = 1 << 20;

/// [clap] derived struct to handle command line parameters.
#[derive(Debug, Parser)]
#[clap(author, version = evoked_common::version!(), about)]
struct Cli {
    /// Trace files to process
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON detection configuration, any value it omits takes its default
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory in which a report is written for each trace file
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of accelerator worker threads. If omitted, no accelerator is used
    #[clap(long)]
    accelerator_threads: Option<usize>,

    /// Staging memory available to the accelerator, in MiB
    #[clap(long, default_value = "1024")]
    accelerator_memory_mb: u64,

    /// If set, OpenMetrics flavour metrics are served on this endpoint
    #[clap(long, env)]
    observability_address: Option<SocketAddr>,

    /// Log filter directives used when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    log_directives: String,

    /// Emit logs in the compact single line format
    #[clap(long)]
    compact_logs: bool,

    #[command(subcommand)]
    pub(crate) mode: Mode,
}

#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    TraceFile(#[from] TraceFileError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("Cannot write report: {0}")]
    Report(#[from] std::io::Error),
}

impl ProcessError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::TraceFile(TraceFileError::Io(_)) => FailureKind::UnableToReadInput,
            Self::Report(_) => FailureKind::UnableToWriteOutput,
            _ => FailureKind::InvalidInput,
        }
    }
}

fn main() -> miette::Result<()> {
    let args = Cli::parse();

    let tracer = init_tracer!(TracerOptions::new(&args.log_directives, args.compact_logs));

    if let Some(observability_address) = args.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(observability_address)
            .install()
            .into_diagnostic()?;
    }

    describe_counter!(
        FILES_PROCESSED,
        metrics::Unit::Count,
        "Number of trace files processed"
    );
    describe_counter!(
        FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
    describe_counter!(
        ROIS_PASSED,
        metrics::Unit::Count,
        "Number of ROIs retained by the classifier"
    );
    describe_counter!(
        ROIS_EXCLUDED,
        metrics::Unit::Count,
        "Number of ROIs excluded by the classifier"
    );
    describe_counter!(
        ACCELERATOR_FALLBACKS,
        metrics::Unit::Count,
        "Number of normalizations repeated on the cpu after an accelerator failure"
    );

    component_info_metric("trace-to-responses", evoked_common::version!());

    let config = match &args.config {
        Some(path) => DetectionConfig::from_path(path).into_diagnostic()?,
        None => DetectionConfig::default(),
    };

    let accelerator = args
        .accelerator_threads
        .map(|threads| {
            ParallelAccelerator::new(
                threads,
                args.accelerator_memory_mb.saturating_mul(BYTES_PER_MIB),
            )
        })
        .transpose()
        .into_diagnostic()?;
    let context = accelerator
        .as_ref()
        .map(|accelerator| AcceleratorContext::with_device(accelerator))
        .unwrap_or_default();

    std::fs::create_dir_all(&args.output_dir).into_diagnostic()?;

    let protocol = args.mode.protocol();
    info!(
        "{} processing {} files under {protocol:?} with {context:?}",
        tracer.service_name(),
        args.inputs.len()
    );

    let processed = args
        .inputs
        .par_iter()
        .filter(|path| {
            match process_file(path, &args.output_dir, &config, &context, &protocol) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Failed to process {}: {e}", path.display());
                    counter!(FAILURES, &[failures::get_label(e.failure_kind())]).increment(1);
                    false
                }
            }
        })
        .count();

    info!("Processed {processed} of {} files", args.inputs.len());
    all_processed(processed, args.inputs.len())
}

/// Fails the run if any trace file could not be processed.
fn all_processed(processed: usize, total: usize) -> miette::Result<()> {
    if processed < total {
        miette::bail!("{} of {total} trace files failed", total - processed);
    }
    Ok(())
}

/// Runs the normalizer and classifier over one trace file and writes its report.
/// # Parameters
/// - path: the trace file.
/// - output_dir: where the report is written.
/// - config: the detection configuration, its frame period may be overridden by the file.
/// - context: the accelerator available to the normalizer.
/// - protocol: the stimulation protocol of the recording.
#[instrument(skip_all, fields(path = %path.display(), num_passed), err(level = "warn"))]
fn process_file(
    path: &Path,
    output_dir: &Path,
    config: &DetectionConfig,
    context: &AcceleratorContext<'_>,
    protocol: &Protocol,
) -> Result<PathBuf, ProcessError> {
    let trace_file = TraceFile::from_path(path)?;
    let traces = trace_file.to_matrix()?;

    let config = match trace_file.ms_per_frame {
        Some(ms_per_frame) => {
            let config = DetectionConfig {
                ms_per_frame,
                ..config.clone()
            };
            config.validate()?;
            config
        }
        None => config.clone(),
    };

    let normalized = normalize(traces.view(), &config.baseline, context, &config)?;
    let classification = classify(
        normalized.dff.view(),
        normalized.baseline_sd.view(),
        &trace_file.roi_ids,
        protocol,
        &config,
    )?;
    tracing::Span::current().record("num_passed", classification.stats.passed);

    counter!(FILES_PROCESSED).increment(1);
    counter!(ROIS_PASSED).increment(classification.stats.passed as u64);
    counter!(ROIS_EXCLUDED).increment(classification.stats.exclusions.len() as u64);

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    let output = output_dir.join(format!("{stem}.responses.json"));
    ResponseReport {
        source: &source,
        protocol,
        backend: normalized.backend,
        classification: &classification,
    }
    .write_to(&output)?;

    info!(
        "{} of {} ROIs retained, report written to {}",
        classification.stats.passed,
        classification.stats.total,
        output.display()
    );
    Ok(output)
}
