use crate::simulation_elements::{
    DistributionError, FloatRandomDistribution, Noise, NoiseSource, Transient, TransientTemplate,
};
use evoked_common::{FrameIndex, Real, RoiId};
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use trace_to_responses::TraceFile;
use tracing::{debug, instrument};

fn one() -> usize {
    1
}

fn default_prefix() -> String {
    "roi".to_owned()
}

/// A group of ROIs sharing the same statistical description.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RoiGroup {
    #[serde(default = "one")]
    pub(crate) count: usize,
    /// ROI ids are formed from this and a running index.
    #[serde(default = "default_prefix")]
    pub(crate) id_prefix: String,
    /// Resting fluorescence of each ROI.
    pub(crate) baseline: FloatRandomDistribution,
    #[serde(default)]
    pub(crate) noises: Vec<NoiseSource>,
    #[serde(default)]
    pub(crate) transients: Vec<TransientTemplate>,
    /// Dead ROIs record zero at every frame.
    #[serde(default)]
    pub(crate) dead: bool,
}

///
/// This struct is created from the configuration JSON file.
///
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Simulation {
    /// Every trial is reproducible from this seed.
    pub(crate) seed: u64,
    pub(crate) num_frames: usize,
    /// Recorded in the generated trace files if present.
    #[serde(default)]
    pub(crate) ms_per_frame: Option<Real>,
    #[serde(default = "one")]
    pub(crate) trials: usize,
    pub(crate) rois: Vec<RoiGroup>,
}

#[derive(Debug, Error)]
pub(crate) enum SimulationError {
    #[error("Cannot read simulation file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid simulation JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),
    #[error("Simulation defines no ROIs")]
    NoRois,
}

impl Simulation {
    pub(crate) fn from_path(path: &Path) -> Result<Self, SimulationError> {
        let simulation: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        if simulation.rois.iter().all(|group| group.count == 0) {
            return Err(SimulationError::NoRois);
        }
        Ok(simulation)
    }

    /// Each ROI of each trial draws from its own generator, so that the output does not
    /// depend on the order in which ROIs are generated.
    fn rng_for(&self, trial: usize, roi: usize) -> StdRng {
        let stream = ((trial as u64) << 32) ^ roi as u64;
        StdRng::seed_from_u64(self.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn roi_ids(&self) -> Vec<(RoiId, &RoiGroup)> {
        self.rois
            .iter()
            .flat_map(|group| {
                (0..group.count).map(move |index| (format!("{}-{index}", group.id_prefix), group))
            })
            .collect()
    }

    #[instrument(skip_all, level = "debug", err(level = "error"))]
    fn generate_trace(
        &self,
        group: &RoiGroup,
        rng: &mut StdRng,
    ) -> Result<Vec<Real>, DistributionError> {
        if group.dead {
            return Ok(vec![0.0; self.num_frames]);
        }
        let baseline = group.baseline.sample(rng)?;
        let transients = group
            .transients
            .iter()
            .map(|template| Transient::sample(template, &mut *rng))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        let mut noises: Vec<Noise> = group.noises.iter().map(Noise::new).collect();

        (0..self.num_frames)
            .map(|frame: FrameIndex| {
                let dff: Real = transients.iter().map(|t| t.value(frame)).sum();
                noises
                    .iter_mut()
                    .try_fold(baseline * (1.0 + dff), |value, noise| {
                        noise.noisify(value, frame, &mut *rng)
                    })
            })
            .collect()
    }

    /// Generates the trace file of one trial.
    #[instrument(skip_all, fields(trial), err(level = "error"))]
    pub(crate) fn generate_trial(&self, trial: usize) -> Result<TraceFile, SimulationError> {
        let (roi_ids, groups): (Vec<_>, Vec<_>) = self.roi_ids().into_iter().unzip();
        let traces = groups
            .par_iter()
            .enumerate()
            .map(|(roi, group)| self.generate_trace(group, &mut self.rng_for(trial, roi)))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Generated {} traces", traces.len());
        Ok(TraceFile {
            roi_ids,
            ms_per_frame: self.ms_per_frame,
            traces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_to_responses::{
        AcceleratorContext, DetectionConfig, Protocol, ResponseCategory, classifier::RoiClassification,
        classify, normalize,
    };

    const JSON_INPUT: &str = r#"
    {
        "seed": 12345,
        "num-frames": 600,
        "ms-per-frame": 5.0,
        "trials": 2,
        "rois": [
            {
                "count": 3,
                "id-prefix": "responder",
                "baseline": { "random-type": "uniform-float", "min": 80.0, "max": 120.0 },
                "noises": [{
                    "distribution": { "random-type": "normal", "mean": 0.0, "sd": 0.5 },
                    "smoothing-window-length": 2
                }],
                "transients": [
                    {
                        "stimulus-frame": 266,
                        "latency": { "random-type": "constant-float", "value": 2.0 },
                        "amplitude": { "random-type": "uniform-float", "min": 0.3, "max": 0.5 },
                        "rise": { "random-type": "constant-float", "value": 0.5 },
                        "decay": { "random-type": "constant-float", "value": 8.0 }
                    }
                ]
            },
            {
                "count": 2,
                "id-prefix": "silent",
                "baseline": { "random-type": "constant-float", "value": 100.0 }
            },
            {
                "id-prefix": "dead",
                "baseline": { "random-type": "constant-float", "value": 100.0 },
                "dead": true
            }
        ]
    }
    "#;

    fn simulation() -> Simulation {
        serde_json::from_str(JSON_INPUT).unwrap()
    }

    #[test]
    fn trial_layout() {
        let trial = simulation().generate_trial(0).unwrap();
        assert_eq!(
            trial.roi_ids,
            vec!["responder-0", "responder-1", "responder-2", "silent-0", "silent-1", "dead-0"]
        );
        assert_eq!(trial.ms_per_frame, Some(5.0));
        assert!(trial.traces.iter().all(|trace| trace.len() == 600));
        assert!(trial.traces[5].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn trials_are_reproducible_and_distinct() {
        let simulation = simulation();
        let first = simulation.generate_trial(0).unwrap();
        assert_eq!(first, simulation.generate_trial(0).unwrap());
        assert_ne!(first, simulation.generate_trial(1).unwrap());
    }

    #[test]
    fn generated_responses_are_detected() {
        let trial = simulation().generate_trial(0).unwrap();
        let traces = trial.to_matrix().unwrap();
        let config = DetectionConfig::default();
        let normalized = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::unavailable(),
            &config,
        )
        .unwrap();
        let result = classify(
            normalized.dff.view(),
            normalized.baseline_sd.view(),
            &trial.roi_ids,
            &Protocol::SingleStimulus,
            &config,
        )
        .unwrap();
        assert_eq!(result.roi_ids, vec!["responder-0", "responder-1", "responder-2"]);

        let result = classify(
            normalized.dff.view(),
            normalized.baseline_sd.view(),
            &trial.roi_ids,
            &Protocol::PairedPulse {
                interstimulus_ms: 100.0,
            },
            &config,
        )
        .unwrap();
        assert_eq!(result.roi_ids, vec!["responder-0", "responder-1", "responder-2"]);
        assert!(result.classifications().all(|(_, classification)| {
            matches!(
                classification,
                RoiClassification::Paired(ResponseCategory::Peak1Only | ResponseCategory::BothPeaks)
            )
        }));
    }

    #[test]
    fn empty_simulation_rejected() {
        let dir = std::env::temp_dir().join("evoked-simulator-empty.json");
        fs::write(
            &dir,
            r#"{ "seed": 1, "num-frames": 10, "rois": [{ "count": 0, "baseline": { "random-type": "constant-float", "value": 1.0 } }] }"#,
        )
        .unwrap();
        assert!(matches!(
            Simulation::from_path(&dir),
            Err(SimulationError::NoRois)
        ));
    }
}
