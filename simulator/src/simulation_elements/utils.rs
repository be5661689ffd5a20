use evoked_common::Real;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::Deserialize;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DistributionError {
    #[error("Invalid Normal Distribution: {0}")]
    NormalDistribution(#[from] rand_distr::NormalError),
    #[error("Invalid Exponential Distribution: {0}")]
    ExpDistribution(#[from] rand_distr::ExpError),
    #[error("Empty uniform interval [{min}, {max})")]
    EmptyInterval { min: Real, max: Real },
    #[error("Probability {0} is outside [0, 1]")]
    Probability(Real),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", tag = "random-type")]
pub(crate) enum FloatRandomDistribution {
    ConstantFloat { value: Real },
    UniformFloat { min: Real, max: Real },
    Normal { mean: Real, sd: Real },
    Exponential { lifetime: Real },
}

impl FloatRandomDistribution {
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Real, DistributionError> {
        match *self {
            Self::ConstantFloat { value } => Ok(value),
            Self::UniformFloat { min, max } => {
                if min < max {
                    Ok(rng.random_range(min..max))
                } else {
                    Err(DistributionError::EmptyInterval { min, max })
                }
            }
            Self::Normal { mean, sd } => Ok(Normal::new(mean, sd)?.sample(rng)),
            Self::Exponential { lifetime } => Ok(Exp::new(lifetime.recip())?.sample(rng)),
        }
    }
}

/// Draws `true` with the given probability.
pub(crate) fn sample_event<R: Rng + ?Sized>(
    probability: Real,
    rng: &mut R,
) -> Result<bool, DistributionError> {
    if (0.0..=1.0).contains(&probability) {
        Ok(rng.random_bool(probability))
    } else {
        Err(DistributionError::Probability(probability))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Interval<T>
where
    T: Clone,
{
    pub(crate) min: T,
    pub(crate) max: T,
}

impl<T: PartialOrd + Copy> Interval<T> {
    pub(crate) fn range_inclusive(&self) -> RangeInclusive<T> {
        self.min..=self.max
    }

    pub(crate) fn is_in(&self, value: T) -> bool {
        self.range_inclusive().contains(&value)
    }
}
