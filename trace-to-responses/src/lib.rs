//! # Trace to Responses
//!
//! Detects stimulus evoked responses in fluorescence traces recorded from many regions
//! of interest (ROIs).
//!
//! Raw traces are first converted to dF/F by [normalize], which may run on an
//! [Accelerator] and falls back to the general-purpose processor. The result is then
//! passed to [classify], which applies noise adaptive hysteresis thresholds to one or two
//! post-stimulus windows, depending on the [Protocol].
pub mod classifier;
pub mod config;
mod detection;
pub mod normalizer;
pub mod report;
pub mod trace_file;

pub use classifier::{
    Classification, ClassifyError, NoiseClass, Protocol, ProtocolKind, ResponseCategory,
    SingleResponse, ThresholdRecord, classify,
};
pub use config::{BaselineWindow, ConfigError, DetectionConfig};
pub use normalizer::{
    Accelerator, AcceleratorContext, AcceleratorError, Backend, NormalizeError, Normalized,
    ParallelAccelerator, normalize,
};
pub use trace_file::{TraceFile, TraceFileError};
