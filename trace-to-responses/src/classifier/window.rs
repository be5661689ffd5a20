//! Response windows and the scans performed over them.
use super::{outcome::ResponseExtent, thresholds::ThresholdPair};
use crate::detection::{EventFilter, EventPoint, SchmittTrigger};
use evoked_common::{FrameIndex, Real};
use ndarray::{ArrayView1, s};
use serde::Serialize;

/// Contiguous, fixed length range of frames following a stimulus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResponseWindow {
    pub start: FrameIndex,
    pub len: usize,
}

/// Result of scanning one window of one ROI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WindowPeak {
    /// Frame of the maximum, `None` if no frame of the window lies within the trace.
    pub(crate) frame: Option<FrameIndex>,
    /// Largest value in the window, with frames past the trace counting as zero.
    pub(crate) value: Real,
    /// Part of the window lies past the end of the trace.
    pub(crate) clipped: bool,
}

impl WindowPeak {
    /// The windowed upper threshold test.
    ///
    /// A zero `upper` from a flat baseline can only be passed by a positive deflection.
    pub(crate) fn reaches(&self, thresholds: &ThresholdPair) -> bool {
        thresholds.is_finite()
            && self.value.is_finite()
            && self.value >= thresholds.upper
            && self.value > 0.0
    }
}

fn nan_max(max: Real, value: Real) -> Real {
    if max.is_nan() || value.is_nan() {
        Real::NAN
    } else {
        max.max(value)
    }
}

impl ResponseWindow {
    pub fn new(start: FrameIndex, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> FrameIndex {
        self.start.saturating_add(self.len)
    }

    /// The part of the window lying within a trace of `frames` frames.
    fn in_range(&self, frames: usize) -> std::ops::Range<FrameIndex> {
        self.start.min(frames)..self.end().min(frames)
    }

    pub(crate) fn scan(&self, column: ArrayView1<'_, Real>) -> WindowPeak {
        let range = self.in_range(column.len());
        let clipped = self.end() > column.len();
        let mut peak = column
            .slice(s![range.clone()])
            .iter()
            .zip(range)
            .fold(
                WindowPeak {
                    frame: None,
                    value: Real::NEG_INFINITY,
                    clipped,
                },
                |peak, (&value, frame)| {
                    if peak.frame.is_none() || value > peak.value || value.is_nan() {
                        WindowPeak {
                            frame: Some(frame),
                            value: nan_max(peak.value, value),
                            clipped,
                        }
                    } else {
                        peak
                    }
                },
            );
        if clipped && peak.value < 0.0 {
            peak.value = 0.0;
        }
        peak
    }

    /// Follows the response beginning in this window with a Schmitt trigger.
    ///
    /// The first crossing whose onset lies in the window is tracked past the end of
    /// the window until the trace drops below the lower threshold. Later crossings
    /// beginning inside the window are counted as re-triggerings.
    pub(crate) fn extent(
        &self,
        column: ArrayView1<'_, Real>,
        thresholds: &ThresholdPair,
    ) -> Option<ResponseExtent> {
        let end = self.end().min(column.len());
        let mut crossings = column
            .iter()
            .copied()
            .enumerate()
            .skip(self.start)
            .events(SchmittTrigger::new(&thresholds.hysteresis()))
            .take_while(|crossing| crossing.get_time() < end);
        let first = crossings.next()?;
        let crossing = first.get_data();
        Some(ResponseExtent {
            onset: first.get_time(),
            peak_frame: crossing.peak_frame,
            peak_value: crossing.peak_value,
            offset: crossing.offset,
            triggerings: 1 + crossings.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    fn pair(upper: Real, lower: Real) -> ThresholdPair {
        ThresholdPair { upper, lower }
    }

    #[test]
    fn scan_finds_peak() {
        let column = array![0.0, 0.1, 0.5, 0.2, 0.9, 0.0];
        let peak = ResponseWindow::new(1, 3).scan(column.view());
        assert_eq!(peak.frame, Some(2));
        assert_eq!(peak.value, 0.5);
        assert!(!peak.clipped);
    }

    #[test]
    fn clipped_portion_counts_as_zero() {
        let column = array![0.0, -0.3, -0.2];
        let peak = ResponseWindow::new(1, 5).scan(column.view());
        assert!(peak.clipped);
        assert_eq!(peak.value, 0.0);
        assert!(!peak.reaches(&pair(0.0, 0.0)));

        let column = array![0.0, 0.4, 0.2];
        let peak = ResponseWindow::new(1, 5).scan(column.view());
        assert_eq!(peak.value, 0.4);
        assert!(peak.reaches(&pair(0.3, 0.1)));
    }

    #[test]
    fn window_beyond_trace() {
        let column = Array1::<Real>::ones(10);
        let peak = ResponseWindow::new(20, 5).scan(column.view());
        assert_eq!(peak.frame, None);
        assert_eq!(peak.value, 0.0);
        assert!(peak.clipped);
        assert!(!peak.reaches(&pair(0.0, 0.0)));
    }

    #[test]
    fn non_finite_peak_never_reaches() {
        let column = array![0.0, Real::NAN, 5.0];
        let peak = ResponseWindow::new(0, 3).scan(column.view());
        assert!(peak.value.is_nan());
        assert!(!peak.reaches(&pair(0.1, 0.05)));

        let column = array![0.0, Real::INFINITY];
        assert!(!ResponseWindow::new(0, 2).scan(column.view()).reaches(&pair(0.1, 0.05)));
    }

    #[test]
    fn degenerate_thresholds_never_reach() {
        let column = array![0.0, 1.0];
        let peak = ResponseWindow::new(0, 2).scan(column.view());
        assert!(!peak.reaches(&pair(Real::NAN, Real::NAN)));
    }

    #[test]
    fn extent_follows_response_past_window() {
        let column = array![0.0, 0.0, 0.5, 1.0, 0.6, 0.3, 0.1, 0.0];
        let extent = ResponseWindow::new(1, 2)
            .extent(column.view(), &pair(0.4, 0.2))
            .unwrap();
        assert_eq!(extent.onset, 2);
        assert_eq!(extent.peak_frame, 3);
        assert_eq!(extent.peak_value, 1.0);
        assert_eq!(extent.offset, Some(6));
        assert_eq!(extent.triggerings, 1);
    }

    #[test]
    fn extent_counts_retriggering_inside_window() {
        let column = array![0.5, 0.1, 0.6, 0.1, 0.7, 0.1];
        let extent = ResponseWindow::new(0, 4)
            .extent(column.view(), &pair(0.4, 0.2))
            .unwrap();
        assert_eq!(extent.onset, 0);
        assert_eq!(extent.triggerings, 2);
    }

    #[test]
    fn no_extent_without_crossing() {
        let column = array![0.0, 0.1, 0.2];
        assert!(ResponseWindow::new(0, 3)
            .extent(column.view(), &pair(0.4, 0.2))
            .is_none());
    }
}
