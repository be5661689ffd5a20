//! Per-ROI results and the statistics aggregated over a call to [crate::classify].
use super::window::ResponseWindow;
use evoked_common::{FrameIndex, Real, RoiId};
use serde::Serialize;
use std::fmt;
use strum::Display;

/// Result of the single stimulus protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SingleResponse {
    Passes,
    Fails,
}

/// Result of the paired pulse protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResponseCategory {
    BothPeaks,
    #[serde(rename = "peak1-only")]
    #[strum(serialize = "peak1-only")]
    Peak1Only,
    #[serde(rename = "peak2-only")]
    #[strum(serialize = "peak2-only")]
    Peak2Only,
    Fails,
}

impl ResponseCategory {
    pub fn from_windows(first: bool, second: bool) -> Self {
        match (first, second) {
            (true, true) => Self::BothPeaks,
            (true, false) => Self::Peak1Only,
            (false, true) => Self::Peak2Only,
            (false, false) => Self::Fails,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RoiClassification {
    Single(SingleResponse),
    Paired(ResponseCategory),
}

impl RoiClassification {
    /// Whether the ROI is retained in the filtered output.
    pub fn passed(&self) -> bool {
        !matches!(
            self,
            Self::Single(SingleResponse::Fails) | Self::Paired(ResponseCategory::Fails)
        )
    }
}

impl fmt::Display for RoiClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(response) => write!(f, "{response}"),
            Self::Paired(category) => write!(f, "{category}"),
        }
    }
}

/// Why a ROI was removed from the filtered output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExclusionReason {
    /// Every window peak stayed below the upper threshold.
    BelowThreshold,
    /// The baseline SD, and so the thresholds, are not finite.
    DegenerateBaseline,
    /// A window contains a non-finite value.
    NonFiniteResponse,
    /// A window extends past the end of the trace and nothing reached the threshold.
    WindowOutOfRange,
    /// The column repeats an earlier column.
    Duplicate,
}

/// Extent of a response, as followed by the Schmitt trigger.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResponseExtent {
    /// First frame at or above the upper threshold.
    pub onset: FrameIndex,
    pub peak_frame: FrameIndex,
    pub peak_value: Real,
    /// First frame after onset below the lower threshold.
    pub offset: Option<FrameIndex>,
    /// Distinct crossings beginning inside the window.
    pub triggerings: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WindowOutcome {
    pub window: ResponseWindow,
    /// Largest value in the window, zero for the part past the end of the trace.
    pub peak_value: Real,
    pub peak_frame: Option<FrameIndex>,
    pub clipped: bool,
    pub responded: bool,
    pub extent: Option<ResponseExtent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoiOutcome {
    pub roi_id: RoiId,
    /// Column of the ROI in the unfiltered matrix.
    pub column: usize,
    pub classification: RoiClassification,
    pub windows: Vec<WindowOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion: Option<ExclusionReason>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CategoryCounts {
    pub both_peaks: usize,
    #[serde(rename = "peak1-only")]
    pub peak1_only: usize,
    #[serde(rename = "peak2-only")]
    pub peak2_only: usize,
    pub fails: usize,
}

impl CategoryCounts {
    fn add(&mut self, category: ResponseCategory) {
        let count = match category {
            ResponseCategory::BothPeaks => &mut self.both_peaks,
            ResponseCategory::Peak1Only => &mut self.peak1_only,
            ResponseCategory::Peak2Only => &mut self.peak2_only,
            ResponseCategory::Fails => &mut self.fails,
        };
        *count += 1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Exclusion {
    pub roi_id: RoiId,
    pub reason: ExclusionReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassificationStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Only present for the paired pulse protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<CategoryCounts>,
    pub exclusions: Vec<Exclusion>,
}

impl ClassificationStats {
    pub(crate) fn from_outcomes(outcomes: &[RoiOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.total += 1;
            if outcome.classification.passed() {
                stats.passed += 1;
            } else {
                stats.failed += 1;
            }
            if let RoiClassification::Paired(category) = outcome.classification {
                stats.categories.get_or_insert_default().add(category);
            }
            if let Some(reason) = outcome.exclusion {
                stats.exclusions.push(Exclusion {
                    roi_id: outcome.roi_id.clone(),
                    reason,
                });
            }
        }
        stats
    }
}
