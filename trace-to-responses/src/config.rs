//! Defines the immutable configuration shared by the normalizer and the classifier.
//!
//! A [DetectionConfig] is loaded once (typically from a JSON file), validated, and then
//! passed by reference into every call. Every field has a default, so a configuration
//! file only needs to name the values it overrides.
//!
//! Every frame field is a zero based index into the trace, so the default baseline
//! `0..250` covers the first 250 frames and the default stimulus, index 266, is the
//! 267th frame of the recording.
//!
//! ```json
//! {
//!     "ms-per-frame": 5.0,
//!     "baseline": { "start": 0, "end": 250 },
//!     "stimulus-frame": 266,
//!     "noise": { "sd-noise-cutoff": 0.02, "low-noise-sigma": 3.0 }
//! }
//! ```
use evoked_common::{FrameIndex, Real};
use serde::{Deserialize, Serialize};
use std::{fs, ops::Range, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Milliseconds per frame must be positive and finite, got {0}")]
    FramePeriod(Real),
    #[error("Baseline window {start}..{end} is empty")]
    EmptyBaseline { start: FrameIndex, end: FrameIndex },
    #[error("Stimulus frame {stimulus} lies inside the baseline window ending at {baseline_end}")]
    StimulusInBaseline {
        stimulus: FrameIndex,
        baseline_end: FrameIndex,
    },
    #[error("Response window of {0} ms is shorter than one frame")]
    ResponseWindow(Real),
    #[error("Sigma multipliers must be finite and non-negative")]
    NegativeSigma,
    #[error("Lower sigma {lower} must be below low-noise sigma {low}")]
    LowerAboveUpper { lower: Real, low: Real },
    #[error("High-noise sigma {high} must not be below low-noise sigma {low}")]
    HighBelowLow { high: Real, low: Real },
    #[error("Noise cutoff must be finite and non-negative, got {0}")]
    NoiseCutoff(Real),
    #[error("F0 epsilon must be positive and finite, got {0}")]
    Epsilon(Real),
    #[error("Accelerator memory fraction must lie in (0, 1], got {0}")]
    MemoryFraction(Real),
}

/// Contiguous, half-open range of frames forming the pre-stimulus baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BaselineWindow {
    /// First frame of the baseline.
    pub start: FrameIndex,
    /// One past the last frame of the baseline.
    pub end: FrameIndex,
}

impl BaselineWindow {
    pub fn new(start: FrameIndex, end: FrameIndex) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<FrameIndex> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BaselineWindow {
    fn default() -> Self {
        Self::new(0, 250)
    }
}

/// Multipliers and cutoff used to derive the hysteresis thresholds from the baseline SD.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NoiseThresholds {
    /// ROIs whose baseline SD is at most this value are classed as low noise.
    pub sd_noise_cutoff: Real,
    /// Upper threshold multiplier for low noise ROIs.
    pub low_noise_sigma: Real,
    /// Upper threshold multiplier for high noise ROIs.
    pub high_noise_sigma: Real,
    /// Lower threshold multiplier, independent of noise class.
    pub lower_sigma: Real,
}

impl Default for NoiseThresholds {
    fn default() -> Self {
        Self {
            sd_noise_cutoff: 0.02,
            low_noise_sigma: 3.0,
            high_noise_sigma: 4.0,
            lower_sigma: 1.5,
        }
    }
}

impl NoiseThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let sigmas = [self.low_noise_sigma, self.high_noise_sigma, self.lower_sigma];
        if sigmas.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ConfigError::NegativeSigma);
        }
        if !self.sd_noise_cutoff.is_finite() || self.sd_noise_cutoff < 0.0 {
            return Err(ConfigError::NoiseCutoff(self.sd_noise_cutoff));
        }
        if self.lower_sigma >= self.low_noise_sigma {
            return Err(ConfigError::LowerAboveUpper {
                lower: self.lower_sigma,
                low: self.low_noise_sigma,
            });
        }
        if self.high_noise_sigma < self.low_noise_sigma {
            return Err(ConfigError::HighBelowLow {
                high: self.high_noise_sigma,
                low: self.low_noise_sigma,
            });
        }
        Ok(())
    }
}

/// Sizing heuristic deciding when the accelerator is worth using.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AcceleratorLimits {
    /// The trace matrix must contain more elements than this to be dispatched.
    pub min_elements: usize,
    /// Largest fraction of the accelerator's free memory a dispatch may occupy.
    pub memory_fraction: Real,
}

impl Default for AcceleratorLimits {
    fn default() -> Self {
        Self {
            min_elements: 1_000_000,
            memory_fraction: 0.8,
        }
    }
}

/// All constants used by [crate::normalize] and [crate::classify].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DetectionConfig {
    /// Sample period of the recording.
    pub ms_per_frame: Real,
    /// Pre-stimulus frames used to estimate resting fluorescence.
    pub baseline: BaselineWindow,
    /// Index of the frame at which the (first) stimulus is delivered.
    pub stimulus_frame: FrameIndex,
    /// Length of each post-stimulus response window.
    pub response_window_ms: Real,
    pub noise: NoiseThresholds,
    /// Floor applied to the baseline mean before dividing by it.
    pub f0_epsilon: Real,
    pub accelerator: AcceleratorLimits,
    /// Collapse identical ROI columns before single stimulus filtering.
    pub deduplicate_columns: bool,
    /// Absolute tolerance (scaled by magnitude above one) when comparing columns.
    pub duplicate_tolerance: Real,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ms_per_frame: 5.0,
            baseline: BaselineWindow::default(),
            stimulus_frame: 266,
            response_window_ms: 250.0,
            noise: NoiseThresholds::default(),
            f0_epsilon: 1e-6,
            accelerator: AcceleratorLimits::default(),
            deduplicate_columns: true,
            duplicate_tolerance: 1e-12,
        }
    }
}

impl DetectionConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Checks the invariants the components rely on, in particular that
    /// `upper > lower` holds for both noise classes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ms_per_frame.is_finite() || self.ms_per_frame <= 0.0 {
            return Err(ConfigError::FramePeriod(self.ms_per_frame));
        }
        if self.baseline.is_empty() {
            return Err(ConfigError::EmptyBaseline {
                start: self.baseline.start,
                end: self.baseline.end,
            });
        }
        if self.stimulus_frame < self.baseline.end {
            return Err(ConfigError::StimulusInBaseline {
                stimulus: self.stimulus_frame,
                baseline_end: self.baseline.end,
            });
        }
        if self.response_window_frames() == 0 {
            return Err(ConfigError::ResponseWindow(self.response_window_ms));
        }
        if !self.f0_epsilon.is_finite() || self.f0_epsilon <= 0.0 {
            return Err(ConfigError::Epsilon(self.f0_epsilon));
        }
        let fraction = self.accelerator.memory_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::MemoryFraction(fraction));
        }
        self.noise.validate()
    }

    /// Number of frames spanned by one response window.
    pub fn response_window_frames(&self) -> usize {
        self.ms_to_frames(self.response_window_ms)
    }

    /// Converts a duration into a whole number of frames, rounding to nearest.
    pub fn ms_to_frames(&self, ms: Real) -> usize {
        let frames = (ms / self.ms_per_frame).round();
        if frames.is_finite() && frames > 0.0 {
            frames as usize
        } else {
            0
        }
    }
}
