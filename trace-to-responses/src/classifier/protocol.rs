//! Stimulation protocols and the response windows they define.
use super::{
    ClassifyError,
    outcome::{ResponseCategory, RoiClassification, SingleResponse},
    window::ResponseWindow,
};
use crate::config::DetectionConfig;
use evoked_common::Real;
use serde::Serialize;
use strum::{Display, EnumString};

/// The protocol name as recorded in experiment metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum ProtocolKind {
    #[strum(serialize = "1AP")]
    SingleStimulus,
    #[strum(serialize = "PPF")]
    PairedPulse,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Protocol {
    /// One stimulus, one response window.
    SingleStimulus,
    /// Two stimuli separated by `interstimulus_ms`, one response window after each.
    PairedPulse {
        #[serde(rename = "interstimulus-ms")]
        interstimulus_ms: Real,
    },
}

impl Protocol {
    /// Builds a protocol from metadata, which may lack the inter-stimulus interval.
    pub fn from_metadata(
        kind: ProtocolKind,
        interstimulus_ms: Option<Real>,
    ) -> Result<Self, ClassifyError> {
        match kind {
            ProtocolKind::SingleStimulus => Ok(Self::SingleStimulus),
            ProtocolKind::PairedPulse => interstimulus_ms
                .map(|interstimulus_ms| Self::PairedPulse { interstimulus_ms })
                .ok_or(ClassifyError::MissingInterval),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::SingleStimulus => ProtocolKind::SingleStimulus,
            Self::PairedPulse { .. } => ProtocolKind::PairedPulse,
        }
    }

    /// The windows in which a response is searched for, in stimulus order.
    ///
    /// The single stimulus window opens one frame after the stimulus. Paired pulse
    /// windows open on each stimulus frame, and the first is shortened so that it
    /// never runs into the second.
    pub fn response_windows(
        &self,
        config: &DetectionConfig,
    ) -> Result<Vec<ResponseWindow>, ClassifyError> {
        let len = config.response_window_frames();
        let stimulus = config.stimulus_frame;
        match *self {
            Self::SingleStimulus => Ok(vec![ResponseWindow::new(stimulus.saturating_add(1), len)]),
            Self::PairedPulse { interstimulus_ms } => {
                if !interstimulus_ms.is_finite() || interstimulus_ms <= 0.0 {
                    return Err(ClassifyError::InvalidInterval(interstimulus_ms));
                }
                let interval = config.ms_to_frames(interstimulus_ms);
                if interval == 0 {
                    return Err(ClassifyError::IntervalBelowFrame {
                        interstimulus_ms,
                        ms_per_frame: config.ms_per_frame,
                    });
                }
                Ok(vec![
                    ResponseWindow::new(stimulus, len.min(interval)),
                    ResponseWindow::new(stimulus.saturating_add(interval), len),
                ])
            }
        }
    }

    /// Combines the per-window test results into the protocol's classification.
    pub(crate) fn categorize(&self, responded: &[bool]) -> RoiClassification {
        match self {
            Self::SingleStimulus => RoiClassification::Single(
                if responded.first().copied().unwrap_or_default() {
                    SingleResponse::Passes
                } else {
                    SingleResponse::Fails
                },
            ),
            Self::PairedPulse { .. } => RoiClassification::Paired(ResponseCategory::from_windows(
                responded.first().copied().unwrap_or_default(),
                responded.get(1).copied().unwrap_or_default(),
            )),
        }
    }
}
