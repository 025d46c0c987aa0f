// ============================================================
// Layer 4: Volume Comparison
// ============================================================
// Voxel-wise difference of two scans, e.g. the same subject at two
// visits:
//
//   second ─► resize to first's shape (trilinear)
//   diff = first - second
//   threshold = mean(|diff|) + 0.5 · std(|diff|)
//   voxels with |diff| < threshold are set to 0
//
// Only the strongest changes survive the threshold. The result can
// be cut into orthogonal slices for export.

use std::path::Path;

use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::resize_trilinear;
use crate::domain::error::{PipelineError, PipelineResult};

/// Weight of the standard deviation in the noise threshold
pub const THRESHOLD_STD_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Fixed first axis
    Sagittal,
    /// Fixed second axis, rotated 90° counter-clockwise
    Coronal,
    /// Fixed third axis
    Axial,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [Orientation::Sagittal, Orientation::Coronal, Orientation::Axial];

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Sagittal => "sagittal",
            Orientation::Coronal  => "coronal",
            Orientation::Axial    => "axial",
        }
    }

    fn axis(self) -> usize {
        match self {
            Orientation::Sagittal => 0,
            Orientation::Coronal  => 1,
            Orientation::Axial    => 2,
        }
    }
}

/// Statistics of one comparison, written as JSON next to the volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceStats {
    pub shape:          [usize; 3],
    /// The second volume was resampled to `shape`
    pub resampled:      bool,
    pub mean_abs:       f64,
    pub std_abs:        f64,
    pub threshold:      f64,
    /// Voxels that survived the threshold
    pub kept_voxels:    usize,
    pub max_increase:   f32,
    pub max_decrease:   f32,
}

#[derive(Debug, Clone)]
pub struct VolumeDifference {
    /// first - second with sub-threshold voxels zeroed
    pub volume: Array3<f32>,
    pub stats:  DifferenceStats,
}

pub fn difference(first: &Array3<f32>, second: &Array3<f32>) -> PipelineResult<VolumeDifference> {
    if first.is_empty() || second.is_empty() {
        return Err(PipelineError::Config("cannot compare an empty volume".into()));
    }

    let (d, h, w) = first.dim();
    let resampled = second.dim() != first.dim();
    let second = if resampled {
        tracing::warn!("Volumes differ in shape ({:?} vs {:?}); resampling the second", first.dim(), second.dim());
        resize_trilinear(second, [d, h, w])
    } else {
        second.clone()
    };

    let mut diff = first - &second;
    let n = diff.len() as f64;
    let mean_abs = diff.iter().map(|&v| v.abs() as f64).sum::<f64>() / n;
    let var_abs = diff.iter().map(|&v| (v.abs() as f64 - mean_abs).powi(2)).sum::<f64>() / n;
    let std_abs = var_abs.sqrt();
    let threshold = mean_abs + THRESHOLD_STD_WEIGHT * std_abs;

    diff.mapv_inplace(|v| if (v.abs() as f64) < threshold { 0.0 } else { v });

    let stats = DifferenceStats {
        shape: [d, h, w],
        resampled,
        mean_abs,
        std_abs,
        threshold,
        kept_voxels:  diff.iter().filter(|&&v| v != 0.0).count(),
        max_increase: diff.iter().copied().fold(0.0, f32::max),
        max_decrease: diff.iter().copied().fold(0.0, f32::min),
    };
    Ok(VolumeDifference { volume: diff, stats })
}

/// One 2D slice at `index` along the orientation's axis.
pub fn orthogonal_slice(volume: &Array3<f32>, orientation: Orientation, index: usize) -> PipelineResult<Array2<f32>> {
    let axis = orientation.axis();
    let len = volume.len_of(Axis(axis));
    if index >= len {
        return Err(PipelineError::Config(format!(
            "{} slice {index} is out of range (0..{len})",
            orientation.name()
        )));
    }

    let plane = volume.index_axis(Axis(axis), index);
    Ok(match orientation {
        // 90° counter-clockwise: out[i, j] = plane[j, cols - 1 - i]
        Orientation::Coronal => plane.t().slice(s![..;-1, ..]).to_owned(),
        _ => plane.to_owned(),
    })
}

/// Middle slice along the orientation's axis
pub fn middle_slice(volume: &Array3<f32>, orientation: Orientation) -> PipelineResult<Array2<f32>> {
    let len = volume.len_of(Axis(orientation.axis()));
    orthogonal_slice(volume, orientation, len / 2)
}

/// Plain CSV, one slice row per line
pub fn write_slice_csv(path: &Path, slice: &Array2<f32>) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text: String = slice
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",") + "\n")
        .collect();
    std::fs::write(path, text)?;
    Ok(())
}
