//! Converts raw fluorescence traces into dF/F and measures the baseline noise of every ROI.
//!
//! The work is dispatched to an [Accelerator] when one is present and the matrix is large
//! enough to be worth staging, otherwise (or if the accelerator fails) it is performed on
//! the general-purpose processor by [cpu::normalize_matrix].
mod accelerator;
pub(crate) mod cpu;

pub use accelerator::{
    Accelerator, AcceleratorContext, AcceleratorError, ParallelAccelerator, footprint_bytes,
};

use crate::config::{AcceleratorLimits, BaselineWindow, DetectionConfig};
use evoked_common::{FrameIndex, Real, metrics::names::ACCELERATOR_FALLBACKS};
use metrics::counter;
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;
use strum::Display;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Trace matrix has no frames")]
    NoFrames,
    #[error("Trace matrix has no ROIs")]
    NoRois,
    #[error("Baseline window {start}..{end} is empty")]
    EmptyBaseline { start: FrameIndex, end: FrameIndex },
    #[error("Baseline window {start}..{end} exceeds the {frames} recorded frames")]
    BaselineOutOfRange {
        start: FrameIndex,
        end: FrameIndex,
        frames: usize,
    },
}

/// The compute resource that produced a [Normalized] result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Backend {
    Cpu,
    Accelerator,
}

/// Output of [normalize].
#[derive(Clone, Debug)]
pub struct Normalized {
    /// dF/F matrix, frames by ROIs, with every element finite.
    pub dff: Array2<Real>,
    /// Standard deviation of each ROI's dF/F over the baseline window.
    pub baseline_sd: Array1<Real>,
    /// Where the computation actually ran.
    pub backend: Backend,
}

impl Normalized {
    pub fn used_accelerator(&self) -> bool {
        self.backend == Backend::Accelerator
    }
}

/// Decides where a matrix of `element_count` samples should be normalized.
///
/// The accelerator is chosen only if it is present, the matrix is larger than
/// `min_elements`, and the matrix fits within `memory_fraction` of the device's free memory.
pub fn select_backend(
    element_count: usize,
    context: &AcceleratorContext<'_>,
    limits: &AcceleratorLimits,
) -> Backend {
    if !context.is_available() || element_count <= limits.min_elements {
        return Backend::Cpu;
    }
    let budget = context.free_memory_bytes() as Real * limits.memory_fraction;
    if (footprint_bytes(element_count) as Real) < budget {
        Backend::Accelerator
    } else {
        Backend::Cpu
    }
}

fn check_shape(traces: &ArrayView2<'_, Real>, baseline: &BaselineWindow) -> Result<(), NormalizeError> {
    let (frames, rois) = traces.dim();
    if frames == 0 {
        return Err(NormalizeError::NoFrames);
    }
    if rois == 0 {
        return Err(NormalizeError::NoRois);
    }
    if baseline.is_empty() {
        return Err(NormalizeError::EmptyBaseline {
            start: baseline.start,
            end: baseline.end,
        });
    }
    if baseline.end > frames {
        return Err(NormalizeError::BaselineOutOfRange {
            start: baseline.start,
            end: baseline.end,
            frames,
        });
    }
    Ok(())
}

/// Computes dF/F = (F - F0) / F0 for every ROI, where F0 is the mean of the ROI over
/// `baseline`, together with the baseline standard deviation of the result.
///
/// An accelerator failure is never surfaced to the caller: it is logged, counted and the
/// computation is repeated on the general-purpose processor.
#[instrument(skip_all, fields(frames = traces.nrows(), rois = traces.ncols(), backend))]
pub fn normalize(
    traces: ArrayView2<'_, Real>,
    baseline: &BaselineWindow,
    context: &AcceleratorContext<'_>,
    config: &DetectionConfig,
) -> Result<Normalized, NormalizeError> {
    check_shape(&traces, baseline)?;

    let mut backend = select_backend(traces.len(), context, &config.accelerator);
    let mut result = None;
    if let (Backend::Accelerator, Some(device)) = (backend, context.device()) {
        match device.normalize(traces, baseline.range(), config.f0_epsilon) {
            Ok(output) => result = Some(output),
            Err(e) => {
                warn!("Accelerator {} failed, falling back to cpu: {e}", device.name());
                counter!(ACCELERATOR_FALLBACKS).increment(1);
                backend = Backend::Cpu;
            }
        }
    }
    let (dff, baseline_sd) = match result {
        Some(output) => output,
        None => cpu::normalize_matrix(traces, baseline.range(), config.f0_epsilon),
    };

    tracing::Span::current().record("backend", backend.to_string());
    debug!("Normalized traces on {backend}");
    Ok(Normalized {
        dff,
        baseline_sd,
        backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Axis, array};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    struct BrokenDevice;

    impl Accelerator for BrokenDevice {
        fn name(&self) -> &str {
            "broken"
        }

        fn free_memory_bytes(&self) -> u64 {
            u64::MAX
        }

        fn normalize(
            &self,
            _: ArrayView2<'_, Real>,
            _: std::ops::Range<FrameIndex>,
            _: Real,
        ) -> Result<(Array2<Real>, Array1<Real>), AcceleratorError> {
            Err(AcceleratorError::Device("lost".to_owned()))
        }
    }

    fn small_config(min_elements: usize) -> DetectionConfig {
        DetectionConfig {
            baseline: BaselineWindow::new(0, 20),
            stimulus_frame: 25,
            accelerator: AcceleratorLimits {
                min_elements,
                memory_fraction: 0.8,
            },
            ..Default::default()
        }
    }

    fn random_traces(frames: usize, rois: usize, seed: u64) -> Array2<Real> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((frames, rois), |_| rng.random_range(50.0..150.0))
    }

    #[test]
    fn selection_rules() {
        let limits = AcceleratorLimits::default();
        let device = ParallelAccelerator::new(1, 100_000_000).unwrap();
        let context = AcceleratorContext::with_device(&device);

        assert_eq!(select_backend(10, &AcceleratorContext::unavailable(), &limits), Backend::Cpu);
        assert_eq!(select_backend(1_000_000, &context, &limits), Backend::Cpu);
        assert_eq!(select_backend(1_000_001, &context, &limits), Backend::Accelerator);
        // Budget is 80MB, i.e. 10M elements.
        assert_eq!(select_backend(10_000_001, &context, &limits), Backend::Cpu);
        assert_eq!(select_backend(9_999_000, &context, &limits), Backend::Accelerator);
    }

    #[test]
    fn baseline_mean_is_zero() {
        let traces = random_traces(40, 6, 1);
        let config = small_config(1_000_000);
        let out = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::unavailable(),
            &config,
        )
        .unwrap();
        assert_eq!(out.backend, Backend::Cpu);
        assert_eq!(out.dff.dim(), (40, 6));
        assert_eq!(out.baseline_sd.len(), 6);
        for roi in out.dff.axis_iter(Axis(1)) {
            let mean = roi.iter().take(20).sum::<Real>() / 20.0;
            assert_approx_eq!(mean, 0.0, 1e-9);
        }
    }

    #[test]
    fn accelerator_agrees_with_cpu() {
        let traces = random_traces(60, 37, 7);
        let device = ParallelAccelerator::new(4, 1 << 24).unwrap().with_rois_per_block(5);
        let config = small_config(0);

        let accelerated = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::with_device(&device),
            &config,
        )
        .unwrap();
        let reference = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::unavailable(),
            &config,
        )
        .unwrap();

        assert!(accelerated.used_accelerator());
        assert!(!reference.used_accelerator());
        for (a, c) in accelerated.dff.iter().zip(reference.dff.iter()) {
            assert_approx_eq!(a, c, 1e-4);
        }
        for (a, c) in accelerated.baseline_sd.iter().zip(reference.baseline_sd.iter()) {
            assert_approx_eq!(a, c, 1e-4);
        }
    }

    #[test]
    fn accelerator_failure_falls_back_to_cpu() {
        let traces = random_traces(30, 4, 3);
        let config = small_config(0);
        let out = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::with_device(&BrokenDevice),
            &config,
        )
        .unwrap();
        assert_eq!(out.backend, Backend::Cpu);
        assert!(out.dff.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn accelerator_out_of_memory_falls_back_to_cpu() {
        let traces = random_traces(30, 4, 3);
        let device = ParallelAccelerator::new(1, 8).unwrap();
        let mut config = small_config(0);
        config.accelerator.memory_fraction = 1.0;
        // Selection rejects it, so the device is never asked.
        let out = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::with_device(&device),
            &config,
        )
        .unwrap();
        assert_eq!(out.backend, Backend::Cpu);
    }

    #[test]
    fn rejects_bad_shapes() {
        let config = small_config(0);
        let context = AcceleratorContext::unavailable();

        let empty = Array2::<Real>::zeros((0, 3));
        assert!(matches!(
            normalize(empty.view(), &config.baseline, &context, &config),
            Err(NormalizeError::NoFrames)
        ));

        let no_rois = Array2::<Real>::zeros((30, 0));
        assert!(matches!(
            normalize(no_rois.view(), &config.baseline, &context, &config),
            Err(NormalizeError::NoRois)
        ));

        let short = Array2::<Real>::ones((10, 2));
        assert!(matches!(
            normalize(short.view(), &config.baseline, &context, &config),
            Err(NormalizeError::BaselineOutOfRange { frames: 10, .. })
        ));

        let traces = Array2::<Real>::ones((30, 2));
        assert!(matches!(
            normalize(traces.view(), &BaselineWindow::new(4, 4), &context, &config),
            Err(NormalizeError::EmptyBaseline { .. })
        ));
    }

    #[test]
    fn dead_roi_is_finite_with_zero_sd() {
        let mut traces = random_traces(30, 3, 11);
        traces.column_mut(1).fill(0.0);
        let config = small_config(1_000_000);
        let out = normalize(
            traces.view(),
            &config.baseline,
            &AcceleratorContext::unavailable(),
            &config,
        )
        .unwrap();
        assert!(out.dff.iter().all(|v| v.is_finite()));
        assert_eq!(out.baseline_sd[1], 0.0);
    }

    #[test]
    fn known_values() {
        let traces = array![[100.0, 10.0], [100.0, 10.0], [150.0, 5.0]];
        let config = DetectionConfig::default();
        let out = normalize(
            traces.view(),
            &BaselineWindow::new(0, 2),
            &AcceleratorContext::unavailable(),
            &config,
        )
        .unwrap();
        assert_approx_eq!(out.dff[[2, 0]], 0.5);
        assert_approx_eq!(out.dff[[2, 1]], -0.5);
    }
}
