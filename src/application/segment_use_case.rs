// ============================================================
// Layer 2: SegmentUseCase
// ============================================================
// Runs FastSurfer once per subject in the dataset index. Subjects
// whose segmentation already exists are skipped, so an interrupted
// run can simply be started again.
//
// A failed subject is never retried. With `strict` the run stops
// at the first failure; otherwise the failure is logged and listed
// in the returned summary.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::config::ExperimentConfig;
use crate::data::index::DatasetIndex;
use crate::infra::fastsurfer::FastSurferRunner;

#[derive(Debug, Default)]
pub struct SegmentationSummary {
    /// (subject, segmentation path) produced by this run
    pub segmented: Vec<(String, PathBuf)>,
    /// Subjects that already had a segmentation
    pub skipped:   Vec<String>,
    /// (subject, error message)
    pub failed:    Vec<(String, String)>,
}

pub struct SegmentUseCase {
    config: ExperimentConfig,
}

impl SegmentUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SegmentationSummary> {
        let cfg = &self.config;
        cfg.validate().context("Invalid experiment configuration")?;

        let index = DatasetIndex::scan(&cfg.data_root, &cfg.class_set(), &cfg.extensions)
            .with_context(|| format!("Failed to scan '{}'", cfg.data_root.display()))?;
        let runner = FastSurferRunner::new(cfg.fastsurfer.clone())?;
        tracing::info!("Segmenting {} subjects with FastSurfer", index.len());

        let mut summary = SegmentationSummary::default();
        for entry in index.entries() {
            if runner.output_path(&entry.id).is_file() {
                tracing::debug!("'{}' already segmented, skipping", entry.id);
                summary.skipped.push(entry.id.clone());
                continue;
            }
            match runner.segment(&entry.path, &entry.id) {
                Ok(path) => summary.segmented.push((entry.id.clone(), path)),
                Err(e) if !cfg.strict => {
                    tracing::warn!("Segmentation of '{}' failed: {}", entry.id, e);
                    summary.failed.push((entry.id.clone(), e.to_string()));
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Segmentation of '{}' failed", entry.id));
                }
            }
        }

        tracing::info!(
            "Segmentation finished: {} new, {} skipped, {} failed",
            summary.segmented.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
