// ============================================================
// Layer 4: Volume Dataset
// ============================================================
// Binds Dataset Index entries to the loading chain:
//
//   SampleRef ─► VolumeSource::load ─► (ROI crop) ─► Preprocessor
//             ─► (Augmenter, only when a seed is supplied) ─► Sample
//
// Nothing is cached: every call re-reads the file. Batches are
// loaded in parallel with rayon while the model runs on the main
// thread's backend.
//
// Strictness:
//   strict   → the first data error aborts the batch
//   lenient  → failing samples are logged and skipped

use std::sync::Arc;

use rayon::prelude::*;

use crate::data::augmenter::Augmenter;
use crate::data::preprocessor::Preprocessor;
use crate::data::roi::{crop_to_labels, RoiConfig};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::{Sample, SampleRef};
use crate::domain::traits::VolumeSource;

/// One item to load: dataset index plus optional augmentation seed
pub type LoadRequest = (usize, Option<u64>);

#[derive(Clone)]
pub struct VolumeDataset {
    entries:      Vec<SampleRef>,
    source:       Arc<dyn VolumeSource>,
    preprocessor: Preprocessor,
    augmenter:    Option<Augmenter>,
    roi:          Option<RoiConfig>,
    strict:       bool,
}

impl VolumeDataset {
    pub fn new(entries: Vec<SampleRef>, source: Arc<dyn VolumeSource>, preprocessor: Preprocessor) -> Self {
        Self { entries, source, preprocessor, augmenter: None, roi: None, strict: true }
    }

    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = augmenter.is_enabled().then_some(augmenter);
        self
    }

    pub fn with_roi(mut self, roi: RoiConfig) -> Self {
        self.roi = roi.enabled.then_some(roi);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SampleRef] {
        &self.entries
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.entries.get(index).map(|e| e.label)
    }

    /// Load and preprocess one sample. `augment_seed` is ignored when no
    /// augmenter is configured.
    pub fn load(&self, index: usize, augment_seed: Option<u64>) -> PipelineResult<Sample> {
        let entry = self.entries.get(index).ok_or_else(|| {
            PipelineError::Config(format!("sample index {index} out of range ({})", self.entries.len()))
        })?;

        let mut raw = self.source.load(&entry.path)?;

        if let Some(roi) = &self.roi {
            let seg_path = roi.label_path(&entry.id);
            let segmentation = self.source.load(&seg_path)?;
            raw = crop_to_labels(&raw, &segmentation, &roi.labels, roi.margin, &entry.path)?;
        }

        let volume = self.preprocessor.process(&raw).map_err(|e| match e {
            PipelineError::Data { reason, .. } => PipelineError::data(&entry.path, reason),
            other => other,
        })?;

        let volume = match (&self.augmenter, augment_seed) {
            (Some(aug), Some(seed)) => aug.apply(&volume, seed),
            _ => volume,
        };

        Ok(Sample { id: entry.id.clone(), label: entry.label, volume })
    }

    /// Load several samples in parallel, keeping request order.
    pub fn load_many(&self, requests: &[LoadRequest]) -> PipelineResult<Vec<Sample>> {
        let results: Vec<PipelineResult<Sample>> = requests
            .par_iter()
            .map(|&(index, seed)| self.load(index, seed))
            .collect();

        let mut samples = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(sample) => samples.push(sample),
                Err(e) if e.is_data_error() && !self.strict => {
                    tracing::warn!("Skipping sample: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(samples)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::augmenter::AugmentConfig;
    use crate::data::preprocessor::PreprocessConfig;
    use crate::test_support::InMemorySource;
    use ndarray::Array3;

    fn dataset(strict: bool) -> VolumeDataset {
        let mut source = InMemorySource::default();
        source.insert("a.nii", Array3::from_shape_fn((6, 6, 6), |(z, _, _)| z as f32));
        source.insert("b.nii", Array3::from_shape_fn((4, 8, 5), |(_, y, _)| y as f32));
        let entries = vec![
            SampleRef::new("a", "a.nii", 0),
            SampleRef::new("b", "b.nii", 1),
            SampleRef::new("missing", "missing.nii", 2),
        ];
        let pre = Preprocessor::new(PreprocessConfig { target_shape: [4, 4, 4], ..PreprocessConfig::default() }).unwrap();
        VolumeDataset::new(entries, Arc::new(source), pre).with_strict(strict)
    }

    #[test]
    fn test_load_preprocesses_to_target() {
        let s = dataset(true).load(1, None).unwrap();
        assert_eq!(s.id, "b");
        assert_eq!(s.label, 1);
        assert_eq!(s.shape(), [4, 4, 4]);
        assert!(s.volume.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_strict_aborts_on_bad_sample() {
        let ds = dataset(true);
        let err = ds.load_many(&[(0, None), (2, None)]).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_lenient_skips_bad_sample() {
        let ds = dataset(false);
        let samples = ds.load_many(&[(2, None), (0, None), (1, None)]).unwrap();
        let ids: Vec<&str> = samples.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_augmentation_only_with_seed() {
        let aug = Augmenter::new(AugmentConfig {
            rotation_prob: 1.0,
            translation_prob: 1.0,
            intensity_prob: 1.0,
            ..AugmentConfig::default()
        })
        .unwrap();
        let ds = dataset(true).with_augmenter(aug);
        let plain = ds.load(0, None).unwrap();
        let again = ds.load(0, None).unwrap();
        let augmented = ds.load(0, Some(5)).unwrap();
        assert_eq!(plain.volume, again.volume);
        assert_ne!(plain.volume, augmented.volume);
    }
}
