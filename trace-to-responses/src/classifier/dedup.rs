//! Detection of repeated ROI columns.
use evoked_common::Real;
use ndarray::{ArrayView1, ArrayView2, Axis, Zip};

fn samples_match(x: Real, y: Real, tolerance: Real) -> bool {
    x.to_bits() == y.to_bits() || (x - y).abs() <= tolerance * x.abs().max(y.abs()).max(1.0)
}

fn columns_match(a: ArrayView1<'_, Real>, b: ArrayView1<'_, Real>, tolerance: Real) -> bool {
    Zip::from(&a)
        .and(&b)
        .all(|&x, &y| samples_match(x, y, tolerance))
}

/// For every column, the index of the first earlier column it repeats, if any.
pub(crate) fn duplicate_of(dff: ArrayView2<'_, Real>, tolerance: Real) -> Vec<Option<usize>> {
    let mut originals = Vec::<usize>::new();
    dff.axis_iter(Axis(1))
        .enumerate()
        .map(|(roi, column)| {
            let original = originals
                .iter()
                .copied()
                .find(|&original| columns_match(dff.column(original), column, tolerance));
            if original.is_none() {
                originals.push(roi);
            }
            original
        })
        .collect()
}
