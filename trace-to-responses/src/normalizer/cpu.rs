//! Reference (general-purpose processor) implementation of the dF/F normalization,
//! together with the column kernels shared with the accelerator.
use evoked_common::{FrameIndex, Real};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use std::ops::Range;

/// Arithmetic mean of the finite values, `NaN` if there are none.
pub(crate) fn finite_mean<I: IntoIterator<Item = Real>>(values: I) -> Real {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        Real::NAN
    } else {
        sum / count as Real
    }
}

/// Population standard deviation of the finite values, zero if there are none.
pub(crate) fn finite_std<I>(values: I) -> Real
where
    I: IntoIterator<Item = Real>,
    I::IntoIter: Clone,
{
    let values = values.into_iter();
    let mean = finite_mean(values.clone());
    if !mean.is_finite() {
        return 0.0;
    }
    let (sum_sq, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum_sq, count), v| {
            (sum_sq + (v - mean).powi(2), count + 1)
        });
    (sum_sq / count as Real).sqrt()
}

/// Floors the baseline fluorescence so that it can be safely divided by.
pub(crate) fn floor_baseline(mean: Real, epsilon: Real) -> Real {
    if mean.is_finite() {
        mean.max(epsilon)
    } else {
        epsilon
    }
}

fn finite_or_zero(value: Real) -> Real {
    if value.is_finite() { value } else { 0.0 }
}

/// Normalizes a single ROI held contiguously in memory, in place.
///
/// Returns the standard deviation of the normalized baseline.
pub(crate) fn normalize_column(
    column: &mut [Real],
    baseline: Range<FrameIndex>,
    epsilon: Real,
) -> Real {
    let baseline_values = column.get(baseline.clone()).unwrap_or_default();
    let f0 = floor_baseline(finite_mean(baseline_values.iter().copied()), epsilon);
    for value in column.iter_mut() {
        *value = finite_or_zero((*value - f0) / f0);
    }
    finite_std(column.get(baseline).unwrap_or_default().iter().copied())
}

/// Computes the dF/F matrix and baseline SD vector with whole-matrix array operations.
///
/// The caller guarantees that `baseline` lies within the frame axis.
pub(crate) fn normalize_matrix(
    traces: ArrayView2<'_, Real>,
    baseline: Range<FrameIndex>,
    epsilon: Real,
) -> (Array2<Real>, Array1<Real>) {
    let f0: Array1<Real> = traces
        .slice(s![baseline.clone(), ..])
        .axis_iter(Axis(1))
        .map(|roi| floor_baseline(finite_mean(roi.iter().copied()), epsilon))
        .collect();

    let mut dff = (&traces - &f0) / &f0;
    dff.mapv_inplace(finite_or_zero);

    let baseline_sd = dff
        .slice(s![baseline, ..])
        .axis_iter(Axis(1))
        .map(|roi| finite_std(roi.iter().copied()))
        .collect();
    (dff, baseline_sd)
}
