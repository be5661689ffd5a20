//! Decides, per ROI, whether a genuine stimulus evoked response occurred.
//!
//! Every ROI is classified independently: its baseline SD selects a noise class and a
//! pair of hysteresis thresholds, each response window of the protocol is tested against
//! the upper threshold, and the lower threshold is used to follow the extent of any
//! response found.
mod dedup;
mod outcome;
mod protocol;
mod thresholds;
mod window;

pub use outcome::{
    CategoryCounts, ClassificationStats, Exclusion, ExclusionReason, ResponseCategory,
    ResponseExtent, RoiClassification, RoiOutcome, SingleResponse, WindowOutcome,
};
pub use protocol::{Protocol, ProtocolKind};
pub use thresholds::{NoiseClass, ThresholdPair, ThresholdRecord};
pub use window::ResponseWindow;

use crate::config::{ConfigError, DetectionConfig};
use evoked_common::{Real, RoiId};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("dF/F has {dff} ROI columns but {baseline_sd} baseline SDs and {roi_ids} ROI ids")]
    RoiCountMismatch {
        dff: usize,
        baseline_sd: usize,
        roi_ids: usize,
    },
    #[error("No ROIs to classify")]
    NoRois,
    #[error("Paired pulse protocol requires an inter-stimulus interval")]
    MissingInterval,
    #[error("Inter-stimulus interval must be positive and finite, got {0} ms")]
    InvalidInterval(Real),
    #[error("Inter-stimulus interval of {interstimulus_ms} ms is shorter than a {ms_per_frame} ms frame")]
    IntervalBelowFrame {
        interstimulus_ms: Real,
        ms_per_frame: Real,
    },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Output of [classify].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Classification {
    /// Columns of the retained ROIs, in their original order.
    #[serde(skip)]
    pub dff: Array2<Real>,
    /// Ids of the retained ROIs.
    pub roi_ids: Vec<RoiId>,
    /// Thresholds of the retained ROIs.
    pub thresholds: Vec<ThresholdRecord>,
    /// Outcome of every input ROI, retained or not.
    pub outcomes: Vec<RoiOutcome>,
    pub stats: ClassificationStats,
}

impl Classification {
    /// Classification of each retained ROI.
    pub fn classifications(&self) -> impl Iterator<Item = (&RoiId, RoiClassification)> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.classification.passed())
            .map(|outcome| (&outcome.roi_id, outcome.classification))
    }
}

struct ClassifiedRoi {
    outcome: RoiOutcome,
    record: ThresholdRecord,
}

fn exclusion_reason(
    duplicate: bool,
    thresholds: &ThresholdPair,
    windows: &[WindowOutcome],
) -> ExclusionReason {
    if duplicate {
        ExclusionReason::Duplicate
    } else if !thresholds.is_finite() {
        ExclusionReason::DegenerateBaseline
    } else if windows.iter().any(|window| !window.peak_value.is_finite()) {
        ExclusionReason::NonFiniteResponse
    } else if windows.iter().any(|window| window.clipped) {
        ExclusionReason::WindowOutOfRange
    } else {
        ExclusionReason::BelowThreshold
    }
}

/// Everything shared by the classification of the ROIs of one call.
struct RoiClassifier<'a> {
    windows: Vec<ResponseWindow>,
    protocol: &'a Protocol,
    config: &'a DetectionConfig,
}

impl RoiClassifier<'_> {
    fn classify(
        &self,
        column_index: usize,
        column: ArrayView1<'_, Real>,
        baseline_sd: Real,
        roi_id: &RoiId,
        duplicate: bool,
    ) -> ClassifiedRoi {
        let noise = &self.config.noise;
        let noise_class = NoiseClass::from_baseline_sd(baseline_sd, noise);
        let thresholds = ThresholdPair::new(baseline_sd, noise_class, noise);

        let windows: Vec<WindowOutcome> = self
            .windows
            .iter()
            .map(|window| {
                let peak = window.scan(column);
                let responded = !duplicate && peak.reaches(&thresholds);
                WindowOutcome {
                    window: *window,
                    peak_value: peak.value,
                    peak_frame: peak.frame,
                    clipped: peak.clipped,
                    responded,
                    extent: responded
                        .then(|| window.extent(column, &thresholds))
                        .flatten(),
                }
            })
            .collect();

        let responded: Vec<bool> = windows.iter().map(|window| window.responded).collect();
        let classification = self.protocol.categorize(&responded);
        let exclusion = (!classification.passed())
            .then(|| exclusion_reason(duplicate, &thresholds, &windows));

        ClassifiedRoi {
            outcome: RoiOutcome {
                roi_id: roi_id.clone(),
                column: column_index,
                classification,
                windows,
                exclusion,
            },
            record: ThresholdRecord::new(roi_id.clone(), noise_class, thresholds, baseline_sd),
        }
    }
}

/// Classifies every ROI of a dF/F matrix under `protocol`, keeping those that responded.
///
/// # Parameters
/// - dff: frames by ROIs, as produced by [crate::normalize].
/// - baseline_sd: one value per ROI column.
/// - roi_ids: one id per ROI column.
///
/// Individual ROIs never cause an error, a ROI which cannot be classified is excluded and
/// the reason recorded in the statistics.
#[instrument(skip_all, fields(protocol = %protocol.kind(), rois = roi_ids.len(), num_passed))]
pub fn classify(
    dff: ArrayView2<'_, Real>,
    baseline_sd: ArrayView1<'_, Real>,
    roi_ids: &[RoiId],
    protocol: &Protocol,
    config: &DetectionConfig,
) -> Result<Classification, ClassifyError> {
    config.validate()?;
    let rois = dff.ncols();
    if rois != baseline_sd.len() || rois != roi_ids.len() {
        return Err(ClassifyError::RoiCountMismatch {
            dff: rois,
            baseline_sd: baseline_sd.len(),
            roi_ids: roi_ids.len(),
        });
    }
    if rois == 0 {
        return Err(ClassifyError::NoRois);
    }

    let windows = protocol.response_windows(config)?;
    debug!("Response windows {windows:?}");

    let duplicates = match protocol {
        Protocol::SingleStimulus if config.deduplicate_columns => {
            dedup::duplicate_of(dff, config.duplicate_tolerance)
        }
        _ => vec![None; rois],
    };

    let classifier = RoiClassifier {
        windows,
        protocol,
        config,
    };
    let classified: Vec<ClassifiedRoi> = (0..rois)
        .into_par_iter()
        .map(|roi| {
            classifier.classify(
                roi,
                dff.column(roi),
                baseline_sd[roi],
                &roi_ids[roi],
                duplicates[roi].is_some(),
            )
        })
        .collect();

    let retained: Vec<usize> = classified
        .iter()
        .filter(|roi| roi.outcome.classification.passed())
        .map(|roi| roi.outcome.column)
        .collect();
    let (outcomes, records): (Vec<_>, Vec<_>) = classified
        .into_iter()
        .map(|roi| (roi.outcome, roi.record))
        .unzip();
    let thresholds: Vec<ThresholdRecord> = records
        .into_iter()
        .zip(&outcomes)
        .filter(|(_, outcome)| outcome.classification.passed())
        .map(|(record, _)| record)
        .collect();

    let stats = ClassificationStats::from_outcomes(&outcomes);
    tracing::Span::current().record("num_passed", stats.passed);
    debug!(
        "{} of {} ROIs passed, {} excluded",
        stats.passed,
        stats.total,
        stats.exclusions.len()
    );

    Ok(Classification {
        dff: dff.select(Axis(1), &retained),
        roi_ids: thresholds.iter().map(|record| record.roi_id.clone()).collect(),
        thresholds,
        outcomes,
        stats,
    })
}
