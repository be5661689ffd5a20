use super::utils::{DistributionError, FloatRandomDistribution, sample_event};
use evoked_common::{FrameIndex, Real};
use rand::Rng;
use serde::Deserialize;

fn certain() -> Real {
    1.0
}

/// Describes the fluorescence transient evoked by one stimulus.
///
/// Amplitudes are fractional changes of the ROI's baseline, i.e. in dF/F units.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct TransientTemplate {
    pub(crate) stimulus_frame: FrameIndex,
    /// Chance that the stimulus evokes a transient at all.
    #[serde(default = "certain")]
    pub(crate) probability: Real,
    /// Frames between the stimulus and the onset of the transient.
    pub(crate) latency: FloatRandomDistribution,
    pub(crate) amplitude: FloatRandomDistribution,
    /// Time constant of the rising edge, in frames.
    pub(crate) rise: FloatRandomDistribution,
    /// Time constant of the decay, in frames.
    pub(crate) decay: FloatRandomDistribution,
}

/// A transient drawn from a [TransientTemplate].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transient {
    onset: Real,
    amplitude: Real,
    rise: Real,
    decay: Real,
}

impl Transient {
    /// Returns `None` if the stimulus evoked nothing.
    pub(crate) fn sample<R: Rng + ?Sized>(
        template: &TransientTemplate,
        rng: &mut R,
    ) -> Result<Option<Self>, DistributionError> {
        if !sample_event(template.probability, rng)? {
            return Ok(None);
        }
        Ok(Some(Self {
            onset: template.stimulus_frame as Real + template.latency.sample(rng)?.max(0.0),
            amplitude: template.amplitude.sample(rng)?,
            rise: template.rise.sample(rng)?.max(0.0),
            decay: template.decay.sample(rng)?.max(Real::EPSILON),
        }))
    }

    /// Fractional change of fluorescence caused by the transient at `frame`.
    pub(crate) fn value(&self, frame: FrameIndex) -> Real {
        let t = frame as Real - self.onset;
        if t < 0.0 {
            return 0.0;
        }
        let rising = if self.rise > 0.0 {
            1.0 - (-t / self.rise).exp()
        } else {
            1.0
        };
        self.amplitude * rising * (-t / self.decay).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn template(probability: Real) -> TransientTemplate {
        TransientTemplate {
            stimulus_frame: 10,
            probability,
            latency: FloatRandomDistribution::ConstantFloat { value: 2.0 },
            amplitude: FloatRandomDistribution::ConstantFloat { value: 0.5 },
            rise: FloatRandomDistribution::ConstantFloat { value: 0.0 },
            decay: FloatRandomDistribution::ConstantFloat { value: 4.0 },
        }
    }

    #[test]
    fn instant_rise_then_decay() {
        let mut rng = StdRng::seed_from_u64(3);
        let transient = Transient::sample(&template(1.0), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(transient.value(11), 0.0);
        assert_approx_eq!(transient.value(12), 0.5);
        assert_approx_eq!(transient.value(16), 0.5 * (-1.0 as Real).exp());
    }

    #[test]
    fn unlikely_stimulus_evokes_nothing() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(Transient::sample(&template(0.0), &mut rng).unwrap(), None);
    }

    #[test]
    fn rising_edge_starts_at_zero() {
        let transient = Transient {
            onset: 0.0,
            amplitude: 1.0,
            rise: 2.0,
            decay: 20.0,
        };
        assert_eq!(transient.value(0), 0.0);
        assert!(transient.value(1) < transient.value(3));
    }
}
