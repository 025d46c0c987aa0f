// ============================================================
// Layer 5: Feature Extractor
// ============================================================
// Runs a trained VolumeClassifier up to its penultimate layer and
// collects one fixed-length row per subject:
//
//   VolumeDataset[indices] ─► batches ─► model.features ─► FeatureSet
//
// Only `features` is called, so no gradients are recorded and no
// parameters change. The result feeds the classical classifiers.

use std::{fs, io::Write, path::Path};

use ndarray::Array2;

use crate::data::dataset::{LoadRequest, VolumeDataset};
use crate::domain::{
    batch::VolumeBatch,
    error::{PipelineError, PipelineResult},
    traits::VolumeClassifier,
};

#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub ids:      Vec<String>,
    pub labels:   Vec<usize>,
    /// (samples, feature_dim)
    pub features: Array2<f64>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    /// `id,label,f0,f1,...` with a header row
    pub fn write_csv(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::File::create(path)?;
        let header: Vec<String> = (0..self.dim()).map(|j| format!("f{j}")).collect();
        writeln!(f, "id,label,{}", header.join(","))?;
        for (i, row) in self.features.rows().into_iter().enumerate() {
            let values: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
            writeln!(f, "{},{},{}", self.ids[i], self.labels[i], values.join(","))?;
        }
        tracing::debug!("Wrote {} feature rows to '{}'", self.len(), path.display());
        Ok(())
    }
}

pub fn extract_features(
    model:      &dyn VolumeClassifier,
    dataset:    &VolumeDataset,
    indices:    &[usize],
    batch_size: usize,
) -> PipelineResult<FeatureSet> {
    let mut ids = Vec::with_capacity(indices.len());
    let mut labels = Vec::with_capacity(indices.len());
    let mut values: Vec<f64> = Vec::new();
    let mut dim: Option<usize> = None;

    for chunk in indices.chunks(batch_size.max(1)) {
        let requests: Vec<LoadRequest> = chunk.iter().map(|&i| (i, None)).collect();
        let samples = dataset.load_many(&requests)?;
        if samples.is_empty() {
            continue;
        }
        let batch = VolumeBatch::from_samples(samples)?;
        let features = model.features(&batch)?;

        let width = *dim.get_or_insert(features.ncols());
        if features.dim() != (batch.len(), width) {
            return Err(PipelineError::Tensor(format!(
                "{} returned features of shape {:?}, expected ({}, {width})",
                model.architecture(),
                features.dim(),
                batch.len()
            )));
        }
        values.extend(features.iter().map(|&v| f64::from(v)));
        ids.extend(batch.ids);
        labels.extend(batch.labels);
    }

    let dim = dim.ok_or_else(|| PipelineError::Config("no samples available for feature extraction".into()))?;
    let features = Array2::from_shape_vec((labels.len(), dim), values)
        .map_err(|e| PipelineError::Tensor(e.to_string()))?;

    tracing::info!(
        "Extracted {}-dimensional {} features for {} samples",
        dim, model.architecture(), labels.len()
    );
    Ok(FeatureSet { ids, labels, features })
}
