//! The JSON trace file read by the driver and written by the simulator.
//!
//! ```json
//! {
//!     "roi-ids": ["roi-0", "roi-1"],
//!     "ms-per-frame": 5.0,
//!     "traces": [[100.0, 101.2, ...], [87.5, 88.1, ...]]
//! }
//! ```
//! `traces` holds one vector of samples per ROI, in the order of `roi-ids`.
use evoked_common::{Real, RoiId};
use ndarray::{Array2, ArrayView2, Axis, ShapeBuilder};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceFileError {
    #[error("Cannot access trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid trace file JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{roi_ids} ROI ids given for {traces} traces")]
    IdCount { roi_ids: usize, traces: usize },
    #[error("Trace of {roi} has {found} frames, expected {expected}")]
    Ragged {
        roi: RoiId,
        expected: usize,
        found: usize,
    },
    #[error("Cannot arrange traces into a matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TraceFile {
    pub roi_ids: Vec<RoiId>,
    /// Overrides the configured frame period when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms_per_frame: Option<Real>,
    pub traces: Vec<Vec<Real>>,
}

impl TraceFile {
    /// Builds a trace file from a frames by ROIs matrix.
    pub fn from_matrix(
        roi_ids: Vec<RoiId>,
        ms_per_frame: Option<Real>,
        traces: ArrayView2<'_, Real>,
    ) -> Self {
        Self {
            roi_ids,
            ms_per_frame,
            traces: traces.axis_iter(Axis(1)).map(|roi| roi.to_vec()).collect(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, TraceFileError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TraceFileError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn num_frames(&self) -> usize {
        self.traces.first().map(Vec::len).unwrap_or_default()
    }

    /// Arranges the traces into a frames by ROIs matrix.
    pub fn to_matrix(&self) -> Result<Array2<Real>, TraceFileError> {
        if self.roi_ids.len() != self.traces.len() {
            return Err(TraceFileError::IdCount {
                roi_ids: self.roi_ids.len(),
                traces: self.traces.len(),
            });
        }
        let frames = self.num_frames();
        if let Some((roi, trace)) = self
            .roi_ids
            .iter()
            .zip(&self.traces)
            .find(|(_, trace)| trace.len() != frames)
        {
            return Err(TraceFileError::Ragged {
                roi: roi.clone(),
                expected: frames,
                found: trace.len(),
            });
        }
        Ok(Array2::from_shape_vec(
            (frames, self.traces.len()).f(),
            self.traces.concat(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn matrix_is_frames_by_rois() {
        let file = TraceFile {
            roi_ids: vec!["a".to_owned(), "b".to_owned()],
            ms_per_frame: None,
            traces: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        };
        let matrix = file.to_matrix().unwrap();
        assert_eq!(matrix, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
        assert_eq!(TraceFile::from_matrix(file.roi_ids.clone(), None, matrix.view()), file);
    }

    #[test]
    fn written_file_reads_back() {
        let file = TraceFile {
            roi_ids: vec!["a".to_owned()],
            ms_per_frame: Some(5.0),
            traces: vec![vec![1.0, 2.0, 3.0]],
        };
        let path = std::env::temp_dir().join("evoked-trace-file-written.json");
        file.write_to(&path).unwrap();
        assert_eq!(TraceFile::from_path(&path).unwrap(), file);
    }

    #[test]
    fn failed_flush_is_reported() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let file = TraceFile {
            roi_ids: vec!["a".to_owned()],
            ms_per_frame: None,
            traces: vec![vec![1.0]],
        };
        assert!(matches!(file.write_to(full), Err(TraceFileError::Io(_))));
    }

    #[test]
    fn parses_kebab_case() {
        let file: TraceFile = serde_json::from_str(
            r#"{ "roi-ids": ["x"], "ms-per-frame": 2.5, "traces": [[1.0, 2.0]] }"#,
        )
        .unwrap();
        assert_eq!(file.ms_per_frame, Some(2.5));
        assert_eq!(file.num_frames(), 2);
    }

    #[test]
    fn ragged_traces_rejected() {
        let file = TraceFile {
            roi_ids: vec!["a".to_owned(), "b".to_owned()],
            ms_per_frame: None,
            traces: vec![vec![1.0, 2.0], vec![3.0]],
        };
        assert!(matches!(
            file.to_matrix(),
            Err(TraceFileError::Ragged { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn id_count_must_match() {
        let file = TraceFile {
            roi_ids: vec!["a".to_owned()],
            ms_per_frame: None,
            traces: vec![vec![1.0], vec![2.0]],
        };
        assert!(matches!(
            file.to_matrix(),
            Err(TraceFileError::IdCount { roi_ids: 1, traces: 2 })
        ));
    }
}
