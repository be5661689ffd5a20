//! Noise classification and the hysteresis thresholds derived from a ROI's baseline SD.
use crate::{config::NoiseThresholds, detection::Hysteresis};
use evoked_common::{Real, RoiId};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether a ROI's baseline is quiet enough for the tighter upper threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NoiseClass {
    Low,
    High,
}

impl NoiseClass {
    /// A non-finite SD is never considered low noise.
    pub fn from_baseline_sd(baseline_sd: Real, noise: &NoiseThresholds) -> Self {
        if baseline_sd <= noise.sd_noise_cutoff {
            Self::Low
        } else {
            Self::High
        }
    }

    fn upper_sigma(self, noise: &NoiseThresholds) -> Real {
        match self {
            Self::Low => noise.low_noise_sigma,
            Self::High => noise.high_noise_sigma,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThresholdPair {
    pub upper: Real,
    pub lower: Real,
}

impl ThresholdPair {
    pub fn new(baseline_sd: Real, noise_class: NoiseClass, noise: &NoiseThresholds) -> Self {
        Self {
            upper: noise_class.upper_sigma(noise) * baseline_sd,
            lower: noise.lower_sigma * baseline_sd,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.upper.is_finite() && self.lower.is_finite()
    }

    pub(crate) fn hysteresis(&self) -> Hysteresis {
        Hysteresis {
            upper: self.upper,
            lower: self.lower,
        }
    }
}

/// Per-ROI record of the statistics the classification was based on.
///
/// This is the persisted output of the classifier, consumed by reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThresholdRecord {
    pub roi_id: RoiId,
    pub noise_class: NoiseClass,
    pub upper: Real,
    pub lower: Real,
    pub baseline_sd: Real,
}

impl ThresholdRecord {
    pub fn new(roi_id: RoiId, noise_class: NoiseClass, pair: ThresholdPair, baseline_sd: Real) -> Self {
        Self {
            roi_id,
            noise_class,
            upper: pair.upper,
            lower: pair.lower,
            baseline_sd,
        }
    }

    pub fn pair(&self) -> ThresholdPair {
        ThresholdPair {
            upper: self.upper,
            lower: self.lower,
        }
    }
}
