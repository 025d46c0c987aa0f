// ============================================================
// Layer 2: CompareUseCase
// ============================================================
// Thresholded voxel-wise difference of two scans:
//
//   Step 1: Load both volumes              (Layer 4 - loader)
//   Step 2: Resample + subtract + threshold (Layer 4 - compare)
//   Step 3: Write results
//             difference.nii   thresholded difference volume
//             summary.json     DifferenceStats
//             <orientation>.csv  middle sagittal / coronal / axial slices

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::data::compare::{difference, middle_slice, write_slice_csv, DifferenceStats, Orientation};
use crate::data::loader::VolumeLoader;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::traits::VolumeSource;

pub struct CompareUseCase {
    first:      PathBuf,
    second:     PathBuf,
    output_dir: PathBuf,
}

impl CompareUseCase {
    pub fn new(first: PathBuf, second: PathBuf, output_dir: PathBuf) -> Self {
        Self { first, second, output_dir }
    }

    pub fn execute(&self) -> Result<DifferenceStats> {
        // ── Step 1: Volumes ───────────────────────────────────────────────────
        let loader = VolumeLoader::new();
        let first = loader
            .load(&self.first)
            .with_context(|| format!("Failed to load '{}'", self.first.display()))?;
        let second = loader
            .load(&self.second)
            .with_context(|| format!("Failed to load '{}'", self.second.display()))?;

        // ── Step 2: Difference ────────────────────────────────────────────────
        let diff = difference(&first, &second).context("Failed to compare the volumes")?;
        tracing::info!(
            "Difference threshold {:.4}: {} of {} voxels kept",
            diff.stats.threshold,
            diff.stats.kept_voxels,
            diff.volume.len()
        );

        // ── Step 3: Outputs ───────────────────────────────────────────────────
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Cannot create '{}'", self.output_dir.display()))?;
        write_nifti(&self.output_dir.join("difference.nii"), &diff.volume)?;
        fs::write(
            self.output_dir.join("summary.json"),
            serde_json::to_string_pretty(&diff.stats)?,
        )?;
        for orientation in Orientation::ALL {
            let slice = middle_slice(&diff.volume, orientation)?;
            write_slice_csv(&self.output_dir.join(format!("{}.csv", orientation.name())), &slice)?;
        }
        Ok(diff.stats)
    }
}

fn write_nifti(path: &Path, volume: &ndarray::Array3<f32>) -> PipelineResult<()> {
    nifti::writer::WriterOptions::new(path)
        .write_nifti(volume)
        .map_err(|e| PipelineError::data(path, format!("cannot write NIfTI: {e}")))
}
