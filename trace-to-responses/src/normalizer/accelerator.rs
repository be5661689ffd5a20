//! The accelerator seam of the normalizer.
//!
//! An [Accelerator] receives a whole trace matrix, stages it into device memory and
//! returns the normalized matrix and baseline SD vector. Dispatch is a sizing decision
//! only, so any implementation must agree with the reference computation in
//! [super::cpu] to within floating point tolerance.
use super::cpu;
use evoked_common::{FrameIndex, Real};
use ndarray::{Array1, Array2, ArrayView2, ShapeBuilder};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{fmt, mem::size_of, ops::Range};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum AcceleratorError {
    #[error("Cannot stage {required} bytes, device has {available} bytes free")]
    OutOfMemory { required: u64, available: u64 },
    #[error("Cannot start accelerator thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Device buffer has unexpected shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Device failure: {0}")]
    Device(String),
}

/// Bytes occupied by a matrix of `element_count` samples.
pub fn footprint_bytes(element_count: usize) -> u64 {
    (element_count as u64).saturating_mul(size_of::<Real>() as u64)
}

/// A compute device able to perform the dF/F normalization.
pub trait Accelerator: Send + Sync {
    /// Human readable device name, used in logs.
    fn name(&self) -> &str;

    /// Memory currently available on the device.
    fn free_memory_bytes(&self) -> u64;

    /// Returns the dF/F matrix and the per-ROI baseline standard deviation.
    ///
    /// The caller guarantees a non-empty matrix and a baseline within the frame axis.
    fn normalize(
        &self,
        traces: ArrayView2<'_, Real>,
        baseline: Range<FrameIndex>,
        f0_epsilon: Real,
    ) -> Result<(Array2<Real>, Array1<Real>), AcceleratorError>;
}

/// Describes which accelerator, if any, may be used by a call to [crate::normalize].
#[derive(Clone, Copy, Default)]
pub struct AcceleratorContext<'a> {
    device: Option<&'a dyn Accelerator>,
}

impl<'a> AcceleratorContext<'a> {
    /// No accelerator is present, every call runs on the general-purpose processor.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_device(device: &'a dyn Accelerator) -> Self {
        Self {
            device: Some(device),
        }
    }

    pub fn is_available(&self) -> bool {
        self.device.is_some()
    }

    /// Free memory reported by the device, zero if there is none.
    pub fn free_memory_bytes(&self) -> u64 {
        self.device
            .map(|device| device.free_memory_bytes())
            .unwrap_or_default()
    }

    pub fn device(&self) -> Option<&'a dyn Accelerator> {
        self.device
    }
}

impl fmt::Debug for AcceleratorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceleratorContext")
            .field("device", &self.device.map(|device| device.name()))
            .field("free_memory_bytes", &self.free_memory_bytes())
            .finish()
    }
}

/// Accelerator backed by a dedicated pool of worker threads with a bounded staging buffer.
///
/// The trace matrix is copied into a column-major device buffer, so that every ROI is
/// contiguous, and blocks of ROIs are normalized concurrently in place.
pub struct ParallelAccelerator {
    name: String,
    pool: ThreadPool,
    capacity_bytes: u64,
    rois_per_block: usize,
}

impl ParallelAccelerator {
    /// Creates a device with `num_threads` workers and `capacity_bytes` of staging memory.
    pub fn new(num_threads: usize, capacity_bytes: u64) -> Result<Self, AcceleratorError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("accelerator-{index}"))
            .build()?;
        Ok(Self {
            name: format!("parallel-accelerator({} threads)", pool.current_num_threads()),
            pool,
            capacity_bytes,
            rois_per_block: 16,
        })
    }

    /// Sets how many ROIs each worker normalizes per task.
    pub fn with_rois_per_block(self, rois_per_block: usize) -> Self {
        Self {
            rois_per_block: rois_per_block.max(1),
            ..self
        }
    }
}

impl Accelerator for ParallelAccelerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn free_memory_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    #[instrument(skip_all, level = "debug", fields(device = %self.name, required_bytes))]
    fn normalize(
        &self,
        traces: ArrayView2<'_, Real>,
        baseline: Range<FrameIndex>,
        f0_epsilon: Real,
    ) -> Result<(Array2<Real>, Array1<Real>), AcceleratorError> {
        let (frames, rois) = traces.dim();
        let required = footprint_bytes(traces.len());
        tracing::Span::current().record("required_bytes", required);
        if required > self.capacity_bytes {
            return Err(AcceleratorError::OutOfMemory {
                required,
                available: self.capacity_bytes,
            });
        }

        let mut device_buffer: Vec<Real> = traces.t().iter().copied().collect();
        let mut baseline_sd = vec![0.0; rois];
        let block_len = frames.max(1) * self.rois_per_block;

        self.pool.install(|| {
            device_buffer
                .par_chunks_mut(block_len)
                .zip(baseline_sd.par_chunks_mut(self.rois_per_block))
                .for_each(|(block, block_sd)| {
                    for (column, sd) in block.chunks_mut(frames.max(1)).zip(block_sd.iter_mut()) {
                        *sd = cpu::normalize_column(column, baseline.clone(), f0_epsilon);
                    }
                })
        });
        debug!("Normalized {rois} ROIs on {}", self.name);

        let dff = Array2::from_shape_vec((frames, rois).f(), device_buffer)?;
        Ok((dff, Array1::from(baseline_sd)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    #[test]
    fn context_reports_device_memory() {
        let device = ParallelAccelerator::new(2, 4096).unwrap();
        let context = AcceleratorContext::with_device(&device);
        assert!(context.is_available());
        assert_eq!(context.free_memory_bytes(), 4096);

        let context = AcceleratorContext::unavailable();
        assert!(!context.is_available());
        assert_eq!(context.free_memory_bytes(), 0);
    }

    #[test]
    fn footprint() {
        assert_eq!(footprint_bytes(0), 0);
        assert_eq!(footprint_bytes(1000), 8000);
    }

    #[test]
    fn out_of_memory() {
        let device = ParallelAccelerator::new(1, 16).unwrap();
        let traces = Array2::<Real>::ones((10, 3));
        let result = device.normalize(traces.view(), 0..5, 1e-6);
        assert!(matches!(
            result,
            Err(AcceleratorError::OutOfMemory {
                required: 240,
                available: 16
            })
        ));
    }

    #[test]
    fn blocks_do_not_mix_rois() {
        let device = ParallelAccelerator::new(3, 1 << 20)
            .unwrap()
            .with_rois_per_block(2);
        let traces = array![
            [1.0, 10.0, 100.0, 5.0, 2.0],
            [1.0, 10.0, 100.0, 5.0, 2.0],
            [2.0, 15.0, 150.0, 10.0, 1.0]
        ];
        let (dff, sd) = device.normalize(traces.view(), 0..2, 1e-6).unwrap();
        assert_eq!(dff.dim(), (3, 5));
        assert_approx_eq!(dff[[2, 0]], 1.0);
        assert_approx_eq!(dff[[2, 1]], 0.5);
        assert_approx_eq!(dff[[2, 2]], 0.5);
        assert_approx_eq!(dff[[2, 3]], 1.0);
        assert_approx_eq!(dff[[2, 4]], -0.5);
        assert!(sd.iter().all(|&sd| sd == 0.0));
    }
}
