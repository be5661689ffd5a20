//! A dual threshold detector.
//!
//! The trigger arms when the trace reaches the upper threshold and only disarms once the
//! trace drops strictly below the lower threshold. Fluctuations between the two thresholds
//! therefore never register as separate crossings. The trigger only arms on a positive
//! value and always resets on a non-positive one, so zero thresholds (from a flat
//! baseline) follow a positive deflection rather than the baseline itself.
use super::Detector;
use crate::detection::EventData;
use evoked_common::{FrameIndex, Real};

#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct Hysteresis {
    /// Level at or above which the trigger arms.
    pub(crate) upper: Real,
    /// Level strictly below which an armed trigger resets.
    pub(crate) lower: Real,
}

/// Data describing one completed (or truncated) crossing.
///
/// The onset frame is the time of the event.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct Crossing {
    pub(crate) peak_frame: FrameIndex,
    pub(crate) peak_value: Real,
    /// First frame below the lower threshold, `None` if the trace ended first.
    pub(crate) offset: Option<FrameIndex>,
}

impl EventData for Crossing {}

#[derive(Clone, Debug)]
struct PartialCrossing {
    onset: FrameIndex,
    peak_frame: FrameIndex,
    peak_value: Real,
}

impl PartialCrossing {
    fn new(onset: FrameIndex, value: Real) -> Self {
        Self {
            onset,
            peak_frame: onset,
            peak_value: value,
        }
    }

    fn update_peak(&mut self, frame: FrameIndex, value: Real) {
        if value > self.peak_value {
            self.peak_frame = frame;
            self.peak_value = value;
        }
    }

    fn into_event(self, offset: Option<FrameIndex>) -> (FrameIndex, Crossing) {
        (
            self.onset,
            Crossing {
                peak_frame: self.peak_frame,
                peak_value: self.peak_value,
                offset,
            },
        )
    }
}

#[derive(Default, Clone, Debug)]
pub(crate) struct SchmittTrigger {
    thresholds: Hysteresis,
    partial_crossing: Option<PartialCrossing>,
}

impl SchmittTrigger {
    pub(crate) fn new(thresholds: &Hysteresis) -> Self {
        Self {
            thresholds: thresholds.clone(),
            partial_crossing: None,
        }
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.partial_crossing.is_some()
    }
}

impl Detector for SchmittTrigger {
    type TracePointType = (FrameIndex, Real);
    type EventPointType = (FrameIndex, Crossing);

    fn signal(&mut self, frame: FrameIndex, value: Real) -> Option<Self::EventPointType> {
        match self.partial_crossing.as_mut() {
            Some(partial_crossing) => {
                if value < self.thresholds.lower || value <= 0.0 {
                    self.partial_crossing
                        .take()
                        .map(|partial_crossing| partial_crossing.into_event(Some(frame)))
                } else {
                    partial_crossing.update_peak(frame, value);
                    None
                }
            }
            None => {
                if value >= self.thresholds.upper && value > 0.0 {
                    self.partial_crossing = Some(PartialCrossing::new(frame, value));
                }
                None
            }
        }
    }

    fn finish(&mut self) -> Option<Self::EventPointType> {
        self.partial_crossing
            .take()
            .map(|partial_crossing| partial_crossing.into_event(None))
    }
}
