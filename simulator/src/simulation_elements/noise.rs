use super::{
    Interval,
    utils::{DistributionError, FloatRandomDistribution},
};
use evoked_common::{FrameIndex, Real};
use rand::Rng;
use serde::Deserialize;
use std::collections::VecDeque;

fn default_smoothing_window_length() -> usize {
    1
}

/// Noise added to a trace, in raw intensity units.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct NoiseSource {
    /// Frames to which the noise is applied, every frame if omitted.
    #[serde(default)]
    bounds: Option<Interval<FrameIndex>>,
    distribution: FloatRandomDistribution,
    /// Length of the moving average window to apply to the noise.
    /// If no smoothing is required, omit this or set it to `1`.
    #[serde(default = "default_smoothing_window_length")]
    smoothing_window_length: usize,
}

impl NoiseSource {
    fn sample<R: Rng + ?Sized>(
        &self,
        frame: FrameIndex,
        rng: &mut R,
    ) -> Result<Real, DistributionError> {
        match &self.bounds {
            Some(bounds) if !bounds.is_in(frame) => Ok(Real::default()),
            _ => self.distribution.sample(rng),
        }
    }
}

pub(crate) struct Noise<'a> {
    source: &'a NoiseSource,
    prev: VecDeque<Real>,
}

impl<'a> Noise<'a> {
    pub(crate) fn new(source: &'a NoiseSource) -> Self {
        Self {
            source,
            prev: Default::default(),
        }
    }

    pub(crate) fn noisify<R: Rng + ?Sized>(
        &mut self,
        value: Real,
        frame: FrameIndex,
        rng: &mut R,
    ) -> Result<Real, DistributionError> {
        if self.prev.len() >= self.source.smoothing_window_length.max(1) {
            self.prev.pop_front();
        }
        self.prev.push_back(self.source.sample(frame, rng)?);
        Ok(value + self.prev.iter().sum::<Real>() / self.prev.len() as Real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn source(json: &str) -> NoiseSource {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn bounded_noise() {
        let source = source(
            r#"{
                "bounds": { "min": 2, "max": 3 },
                "distribution": { "random-type": "constant-float", "value": 1.0 }
            }"#,
        );
        let mut rng = StdRng::seed_from_u64(1);
        let mut noise = Noise::new(&source);
        let values: Vec<Real> = (0..5)
            .map(|frame| noise.noisify(10.0, frame, &mut rng).unwrap())
            .collect();
        assert_eq!(values, vec![10.0, 10.0, 11.0, 11.0, 10.0]);
    }

    #[test]
    fn smoothing_averages_recent_samples() {
        let source = source(
            r#"{
                "distribution": { "random-type": "uniform-float", "min": -1.0, "max": 1.0 },
                "smoothing-window-length": 4
            }"#,
        );
        let mut rng = StdRng::seed_from_u64(7);
        let mut noise = Noise::new(&source);
        let smoothed: Vec<Real> = (0..1000)
            .map(|frame| noise.noisify(0.0, frame, &mut rng).unwrap())
            .collect();
        let mean = smoothed.iter().sum::<Real>() / smoothed.len() as Real;
        let variance =
            smoothed.iter().map(|v| (v - mean).powi(2)).sum::<Real>() / smoothed.len() as Real;
        // Unsmoothed uniform noise on [-1, 1) has variance 1/3.
        assert!(variance < 0.2);
        assert_approx_eq!(mean, 0.0, 0.1);
        assert_eq!(noise.prev.len(), 4);
    }
}
