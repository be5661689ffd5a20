//! Abstractions over the points consumed and produced by detectors.
use evoked_common::{FrameIndex, Real};
use std::fmt::{Debug, Display};

/// Any type used as a time variable.
pub(crate) trait Temporal: Default + Copy + Debug + Display + PartialEq + PartialOrd {}

impl Temporal for FrameIndex {}

/// Time-agnostic values carried by trace points.
pub(crate) trait TraceValue: Default + Clone + Debug {}

impl TraceValue for Real {}

/// A sample of a trace: a time and a value.
pub(crate) trait TracePoint: Clone {
    type Time: Temporal;
    type Value: TraceValue;

    fn get_time(&self) -> Self::Time;

    fn get_value(&self) -> &Self::Value;

    /// Take ownership of a clone of the value without destructing the point.
    fn clone_value(&self) -> Self::Value {
        self.get_value().clone()
    }
}

impl<X, Y> TracePoint for (X, Y)
where
    X: Temporal,
    Y: TraceValue,
{
    type Time = X;
    type Value = Y;

    fn get_time(&self) -> X {
        self.0
    }

    fn get_value(&self) -> &Y {
        &self.1
    }
}

/// Payload of an event, everything except its time.
pub(crate) trait EventData: Default + Clone + Debug {}

/// An event emitted by a detector, made of its time and its data.
pub(crate) trait EventPoint: Debug + Clone {
    type TimeType: Temporal;
    type EventType: EventData;

    fn get_time(&self) -> Self::TimeType;
    fn get_data(&self) -> &Self::EventType;
}

impl<T, E> EventPoint for (T, E)
where
    T: Temporal,
    E: EventData,
{
    type TimeType = T;
    type EventType = E;

    fn get_time(&self) -> T {
        self.0
    }

    fn get_data(&self) -> &E {
        &self.1
    }
}
