//! Converts trace point iterators into event iterators.
use super::{Detector, TracePoint};
use tracing::trace;

/// Applies a detector to a source iterator as it is consumed.
#[derive(Clone)]
pub(crate) struct EventIter<I, D>
where
    I: Iterator<Item = D::TracePointType>,
    D: Detector,
{
    source: I,
    detector: D,
    finished: bool,
}

impl<I, D> Iterator for EventIter<I, D>
where
    I: Iterator<Item = D::TracePointType>,
    D: Detector,
{
    type Item = D::EventPointType;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        for point in self.source.by_ref() {
            if let Some(event) = self.detector.signal(point.get_time(), point.clone_value()) {
                trace!("Event found {event:?}");
                return Some(event);
            }
        }
        self.finished = true;
        self.detector.finish()
    }
}

/// Implemented for any iterator of trace points which supports the `events` method.
pub(crate) trait EventFilter<I, D>
where
    I: Iterator<Item = D::TracePointType>,
    D: Detector,
{
    /// Create an [EventIter], which applies `detector` to the trace as it is consumed.
    fn events(self, detector: D) -> EventIter<I, D>;
}

impl<I, D> EventFilter<I, D> for I
where
    I: Iterator<Item = D::TracePointType>,
    D: Detector,
{
    fn events(self, detector: D) -> EventIter<I, D> {
        EventIter {
            source: self,
            detector,
            finished: false,
        }
    }
}
