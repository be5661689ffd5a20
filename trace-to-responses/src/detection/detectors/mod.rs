//! Detectors are applied by [super::events::EventIter] iterators to a stream of trace points.
//! They register detections in the form of a stream of events.
pub(crate) mod schmitt_trigger;

use super::{EventPoint, TracePoint};

/// Implement for detectors, which take in trace values and output events.
pub(crate) trait Detector: Default + Clone {
    /// Trace type for input.
    type TracePointType: TracePoint;
    /// Event type for output, this must have the same `Time` type as `TracePointType`.
    type EventPointType: EventPoint<TimeType = <Self::TracePointType as TracePoint>::Time>;

    /// Takes in a trace sample and possibly outputs an event.
    fn signal(
        &mut self,
        time: <Self::TracePointType as TracePoint>::Time,
        value: <Self::TracePointType as TracePoint>::Value,
    ) -> Option<Self::EventPointType>;

    /// Call when the trace has ended. If an event is in progress, it is dispatched.
    fn finish(&mut self) -> Option<Self::EventPointType>;
}
