// ============================================================
// Layer 4: Region-of-Interest Cropping
// ============================================================
// Restricts a volume to the bounding box of selected anatomical
// labels (e.g. left/right hippocampus from a FastSurfer
// segmentation), plus a voxel margin.
//
// The label volume must have the same grid as the intensity
// volume. Label files are looked up per subject id:
//
//   fastsurfer → <segmentation_dir>/<id>/mri/aparc.DKTatlas+aseg.deep.mgz
//                (the layout `segment` produces)
//   flat       → <segmentation_dir>/<id><suffix>
//                (e.g. segmentations exported to NIfTI)

use std::path::{Path, PathBuf};

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::infra::fastsurfer::SEGMENTATION_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelLayout {
    FastSurfer,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub enabled: bool,
    /// FastSurfer subjects dir, or a folder of per-subject label files
    pub segmentation_dir: PathBuf,
    pub layout: LabelLayout,
    /// File name suffix appended to the subject id, `flat` layout only
    pub suffix: String,
    /// Label values that make up the region
    pub labels: Vec<i32>,
    /// Extra voxels kept on every side of the bounding box
    pub margin: usize,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            enabled:          false,
            segmentation_dir: PathBuf::from("fastsurfer"),
            layout:           LabelLayout::FastSurfer,
            suffix:           "_aseg.nii.gz".to_string(),
            // FreeSurfer LUT: 17 = Left-Hippocampus, 53 = Right-Hippocampus
            labels:           vec![17, 53],
            margin:           4,
        }
    }
}

impl RoiConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.enabled && self.labels.is_empty() {
            return Err(PipelineError::Config("ROI cropping is enabled but no labels are listed".into()));
        }
        Ok(())
    }

    pub fn label_path(&self, subject_id: &str) -> PathBuf {
        match self.layout {
            LabelLayout::FastSurfer => self.segmentation_dir.join(subject_id).join(SEGMENTATION_FILE),
            LabelLayout::Flat => self.segmentation_dir.join(format!("{subject_id}{}", self.suffix)),
        }
    }
}

/// Crop `volume` to the bounding box of voxels whose label is in `labels`.
pub fn crop_to_labels(
    volume: &Array3<f32>,
    segmentation: &Array3<f32>,
    labels: &[i32],
    margin: usize,
    source: &Path,
) -> PipelineResult<Array3<f32>> {
    if volume.dim() != segmentation.dim() {
        return Err(PipelineError::data(
            source,
            format!(
                "segmentation shape {:?} does not match volume shape {:?}",
                segmentation.dim(),
                volume.dim()
            ),
        ));
    }

    let (d, h, w) = volume.dim();
    let mut lo = [d, h, w];
    let mut hi = [0usize; 3];
    let mut found = false;

    for ((z, y, x), &v) in segmentation.indexed_iter() {
        if labels.contains(&(v.round() as i32)) {
            found = true;
            lo = [lo[0].min(z), lo[1].min(y), lo[2].min(x)];
            hi = [hi[0].max(z), hi[1].max(y), hi[2].max(x)];
        }
    }

    if !found {
        return Err(PipelineError::data(source, format!("none of the ROI labels {labels:?} are present")));
    }

    let dims = [d, h, w];
    let start: Vec<usize> = lo.iter().map(|&l| l.saturating_sub(margin)).collect();
    let end: Vec<usize> = hi.iter().zip(dims.iter()).map(|(&e, &n)| (e + margin).min(n - 1)).collect();

    Ok(volume
        .slice(s![start[0]..=end[0], start[1]..=end[1], start[2]..=end[2]])
        .to_owned())
}
