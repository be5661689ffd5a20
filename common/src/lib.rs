//! Types, tracing setup and metric names shared by the evoked-response components.
pub mod metrics;
pub mod tracer;

pub use const_format;
pub use git_version;
pub use tracer::{TracerEngine, TracerOptions};

/// Floating point type used for every fluorescence sample and derived statistic.
pub type Real = f64;

/// Identifier of a region of interest, as named in the source recording.
pub type RoiId = String;

/// Index of a frame (sample) within a trace.
pub type FrameIndex = usize;

/// Expands to the crate version, followed by the git revision it was built from.
#[macro_export]
macro_rules! version {
    () => {
        $crate::const_format::concatcp!(
            env!("CARGO_PKG_VERSION"),
            " (",
            $crate::git_version::git_version!(fallback = "unknown"),
            ")"
        )
    };
}
