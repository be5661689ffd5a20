mod noise;
mod transients;
mod utils;

pub(crate) use noise::{Noise, NoiseSource};
pub(crate) use transients::{Transient, TransientTemplate};
pub(crate) use utils::{DistributionError, FloatRandomDistribution, Interval};
