// ============================================================
// Layer 2: FeatureUseCase
// ============================================================
// The classical branch, run after CrossValidateUseCase:
//
//   per fold:
//     restore best weights       (Layer 6 - checkpoint)
//     deep features train / val  (Layer 5 - feature_extractor)
//     per classifier kind:
//       grid search on train     (Layer 5 - classical)
//       score on validation      (Layer 5 - evaluator)
//   classical_results.csv        (Layer 6 - report)
//
// The folds are recomputed from the same seed, so every fold's
// classical models see exactly the subjects its network was
// trained on.

use anyhow::{bail, Context, Result};

use crate::application::config::ExperimentConfig;
use crate::data::splitter::stratified_k_fold;
use crate::domain::traits::VolumeClassifier;
use crate::infra::{
    checkpoint::{CheckpointManager, NETWORK_SNAPSHOT},
    report::{mean_std, write_classical_results, ClassicalResult},
};
use crate::ml::classical::grid_search;
use crate::ml::classifier::{build_classifier, TrainDevice};
use crate::ml::evaluator::ClassificationReport;
use crate::ml::feature_extractor::extract_features;

pub struct FeatureUseCase {
    config: ExperimentConfig,
}

impl FeatureUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<ClassicalResult>> {
        let device = TrainDevice::default();
        let network = self.config.network_config();
        let architecture = self.config.architecture;
        self.execute_with(|| build_classifier(architecture, &network, &device))
    }

    /// `new_model` must build the network described by the configured
    /// architecture; each fold's `network.json` is checked against it
    pub fn execute_with<F>(&self, mut new_model: F) -> Result<Vec<ClassicalResult>>
    where
        F: FnMut() -> Box<dyn VolumeClassifier>,
    {
        let cfg = &self.config;
        cfg.validate().context("Invalid experiment configuration")?;
        let arch = cfg.architecture.name();
        let branch = &cfg.features;

        let (index, dataset) = cfg
            .open_dataset()
            .with_context(|| format!("Failed to open dataset at '{}'", cfg.data_root.display()))?;
        let n_classes = index.classes().len();
        let folds = stratified_k_fold(&index.labels(), cfg.folds, cfg.trainer.seed)
            .context("Failed to assign cross-validation folds")?;
        let features_dir = cfg.output_dir.join("features").join(arch);
        let network = cfg.network_config();

        let mut results = Vec::with_capacity(folds.len() * branch.classifiers.len());
        for split in &folds {
            let checkpoints = CheckpointManager::for_fold(&cfg.output_dir, arch, split.fold)?;
            if !checkpoints.has_best() {
                bail!(
                    "Fold {}: no trained {} checkpoint in '{}'; run `train` first",
                    split.fold,
                    arch,
                    checkpoints.dir().display()
                );
            }
            checkpoints
                .check_config(NETWORK_SNAPSHOT, &network)
                .with_context(|| format!("Fold {}: checkpoint does not match the configured network", split.fold))?;
            let mut model = new_model();
            checkpoints
                .load_best(model.as_mut())
                .with_context(|| format!("Fold {}: cannot restore weights", split.fold))?;

            let bs = cfg.trainer.batch_size;
            let train = extract_features(model.as_ref(), &dataset, &split.train, bs)
                .with_context(|| format!("Fold {}: feature extraction (train) failed", split.fold))?;
            let val = extract_features(model.as_ref(), &dataset, &split.validation, bs)
                .with_context(|| format!("Fold {}: feature extraction (validation) failed", split.fold))?;
            if branch.write_features {
                train.write_csv(&features_dir.join(format!("fold_{}_train.csv", split.fold)))?;
                val.write_csv(&features_dir.join(format!("fold_{}_validation.csv", split.fold)))?;
            }

            for &kind in &branch.classifiers {
                let search = grid_search(
                    kind,
                    &branch.grid_for(kind),
                    &train.features,
                    &train.labels,
                    n_classes,
                    branch.cv_folds,
                    cfg.trainer.seed.wrapping_add(split.fold as u64),
                )
                .with_context(|| format!("Fold {}: grid search for {kind} failed", split.fold))?;

                let probabilities = search.predict_proba(&val.features)?;
                let metrics = ClassificationReport::from_probabilities(&val.labels, &probabilities)?;
                tracing::info!(
                    "Fold {} {}: cv_accuracy={:.4}, val_accuracy={:.4}, val_macro_f1={:.4}",
                    split.fold, kind, search.best_score, metrics.accuracy, metrics.macro_f1
                );
                results.push(ClassicalResult {
                    fold:         split.fold,
                    kind,
                    best_params:  search.best_params,
                    cv_accuracy:  search.best_score,
                    val_accuracy: metrics.accuracy,
                    val_macro_f1: metrics.macro_f1,
                });
            }
        }

        for &kind in &branch.classifiers {
            let accuracies: Vec<f64> = results.iter().filter(|r| r.kind == kind).map(|r| r.val_accuracy).collect();
            if let Some(s) = mean_std(&accuracies) {
                tracing::info!("{kind}: validation accuracy {:.4} ± {:.4}", s.mean, s.std);
            }
        }

        write_classical_results(&features_dir.join("classical_results.csv"), &results)
            .context("Failed to write classical results")?;
        Ok(results)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cross_validate_use_case::CrossValidateUseCase;
    use crate::domain::batch::VolumeBatch;
    use crate::domain::error::{PipelineError, PipelineResult};
    use crate::ml::classical::ClassifierKind;
    use crate::test_support::{scratch_dir, write_volume};
    use ndarray::{Array2, Array3, Axis, Slice};
    use std::{fs, path::Path};

    /// Feature a = mean of the lower half along spatial axis a
    struct HalfMeans;

    impl VolumeClassifier for HalfMeans {
        fn architecture(&self) -> &str { "half_means" }
        fn num_classes(&self) -> usize { 3 }
        fn train_step(&mut self, _: &VolumeBatch, _: f64) -> PipelineResult<f64> { Ok(0.5) }
        fn predict(&self, b: &VolumeBatch) -> PipelineResult<Array2<f32>> { Ok(Array2::zeros((b.len(), 3))) }
        fn features(&self, b: &VolumeBatch) -> PipelineResult<Array2<f32>> {
            let mut out = Array2::zeros((b.len(), 3));
            for (i, v) in b.volumes.axis_iter(Axis(0)).enumerate() {
                for a in 0..3 {
                    let half = v.len_of(Axis(a + 1)) / 2;
                    out[[i, a]] = v.slice_axis(Axis(a + 1), Slice::from(0..half)).mean().unwrap_or(0.0);
                }
            }
            Ok(out)
        }
        fn save(&self, path: &Path) -> PipelineResult<()> { Ok(fs::write(path, b"half")?) }
        fn load(&mut self, _: &Path) -> PipelineResult<()> { Ok(()) }
    }

    /// Class c is an intensity ramp along axis c
    fn ramp_dataset(tag: &str) -> std::path::PathBuf {
        let root = scratch_dir(tag);
        for (label, name) in ["CN", "MCI", "AD"].iter().enumerate() {
            for i in 0..8 {
                let volume = Array3::from_shape_fn((6, 6, 6), |(z, y, x)| {
                    let ramp = [z, y, x][label] as f32;
                    ramp + 0.01 * i as f32 * ((z + y + x) % 2) as f32
                });
                write_volume(&root.join(name).join(format!("{name}_{i}.nii")), &volume);
            }
        }
        root
    }

    fn config(tag: &str) -> ExperimentConfig {
        let mut cfg = ExperimentConfig::default();
        cfg.data_root = ramp_dataset(tag);
        cfg.output_dir = scratch_dir(&format!("{tag}_out"));
        cfg.extensions = vec![".nii".into()];
        cfg.folds = 4;
        cfg.preprocess.target_shape = [4, 4, 4];
        cfg.augment.enabled = false;
        cfg.trainer.max_epochs = 1;
        cfg.features.classifiers = vec![ClassifierKind::Knn, ClassifierKind::NaiveBayes];
        cfg.features.cv_folds = 2;
        cfg
    }

    #[test]
    fn test_classical_branch_on_trained_folds() {
        let cfg = config("features_branch");
        CrossValidateUseCase::new(cfg.clone()).execute_with(|| Box::new(HalfMeans)).unwrap();

        let results = FeatureUseCase::new(cfg.clone()).execute_with(|| Box::new(HalfMeans)).unwrap();
        assert_eq!(results.len(), 4 * 2);
        for r in &results {
            assert!(r.val_accuracy >= 0.99, "{} fold {}: {}", r.kind, r.fold, r.val_accuracy);
        }

        let dir = cfg.output_dir.join("features/resnet3d");
        let csv = fs::read_to_string(dir.join("classical_results.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 8);
        assert!(dir.join("fold_0_train.csv").is_file());
        assert!(dir.join("fold_3_validation.csv").is_file());
    }

    #[test]
    fn test_missing_checkpoints_are_reported() {
        let cfg = config("features_untrained");
        let err = FeatureUseCase::new(cfg).execute_with(|| Box::new(HalfMeans)).unwrap_err();
        assert!(err.to_string().contains("run `train` first"));
    }

    #[test]
    fn test_changed_network_is_a_config_error() {
        let cfg = config("features_changed");
        CrossValidateUseCase::new(cfg.clone()).execute_with(|| Box::new(HalfMeans)).unwrap();

        let mut changed = cfg;
        changed.base_channels = 32;
        let err = FeatureUseCase::new(changed).execute_with(|| Box::new(HalfMeans)).unwrap_err();
        assert!(matches!(err.root_cause().downcast_ref::<PipelineError>(), Some(PipelineError::Config(_))));
    }
}
