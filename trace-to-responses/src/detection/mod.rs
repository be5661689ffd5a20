//! Streaming detection of threshold crossings in dF/F traces.
//!
//! A [Detector] consumes `(frame, value)` points one at a time and emits an event
//! whenever it recognises a complete feature of the trace. Detectors are applied to
//! any iterator of trace points with [EventFilter::events].
mod datatype;
mod detectors;
mod events;

pub(crate) use datatype::{EventData, EventPoint, TracePoint};
pub(crate) use detectors::{
    Detector,
    schmitt_trigger::{Hysteresis, SchmittTrigger},
};
pub(crate) use events::EventFilter;
