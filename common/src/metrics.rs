//! Metric names and helpers common to all components.
use metrics::gauge;

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "evoked_";

    pub const COMPONENT_INFO: &str = concatcp!(METRIC_NAME_PREFIX, "component_info");
    pub const FILES_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "files_processed");
    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const ROIS_PASSED: &str = concatcp!(METRIC_NAME_PREFIX, "rois_passed");
    pub const ROIS_EXCLUDED: &str = concatcp!(METRIC_NAME_PREFIX, "rois_excluded");
    pub const ACCELERATOR_FALLBACKS: &str =
        concatcp!(METRIC_NAME_PREFIX, "accelerator_fallbacks");
}

pub mod failures {
    /// Kinds of failure a component reports under [super::names::FAILURES].
    pub enum FailureKind {
        UnableToReadInput,
        InvalidInput,
        UnableToWriteOutput,
    }

    pub fn get_label(kind: FailureKind) -> (&'static str, &'static str) {
        let label = match kind {
            FailureKind::UnableToReadInput => "unable_to_read_input",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::UnableToWriteOutput => "unable_to_write_output",
        };
        ("failure_kind", label)
    }
}

/// Publishes a constant gauge identifying the running component and its version.
pub fn component_info_metric(component: &'static str, version: &'static str) {
    gauge!(
        names::COMPONENT_INFO,
        &[("component", component), ("version", version)]
    )
    .set(1.0);
}
