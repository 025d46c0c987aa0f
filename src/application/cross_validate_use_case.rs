// ============================================================
// Layer 2: CrossValidateUseCase
// ============================================================
// Trains and evaluates one architecture with stratified k-fold
// cross-validation:
//
//   Step 1: Scan the class folders        (Layer 4 - data)
//   Step 2: Stratified fold assignment    (Layer 4 - data)
//   Step 3: Save the effective config     (Layer 2)
//   Step 4: Per fold:
//             fresh model                 (Layer 5 - ml)
//             Trainer.fit + early stop    (Layer 5 - ml)
//             evaluate best weights       (Layer 5 - ml)
//   Step 5: Fold summaries + mean ± std   (Layer 6 - infra)
//
// Each fold starts from freshly initialised weights. The best
// checkpoint of every fold stays on disk for the feature branch.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};

use crate::application::config::ExperimentConfig;
use crate::data::splitter::stratified_k_fold;
use crate::domain::traits::VolumeClassifier;
use crate::infra::{
    checkpoint::{CheckpointManager, NETWORK_SNAPSHOT},
    metrics::MetricsLogger,
    report::{report_dir, CrossValidationReport, FoldSummary},
};
use crate::ml::classifier::{build_classifier, TrainDevice};
use crate::ml::evaluator::Evaluator;
use crate::ml::trainer::Trainer;

pub struct CrossValidateUseCase {
    config: ExperimentConfig,
}

impl CrossValidateUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Run cross-validation with the configured burn architecture
    pub fn execute(&self) -> Result<CrossValidationReport> {
        let device = TrainDevice::default();
        let network = self.config.network_config();
        let architecture = self.config.architecture;
        self.execute_with(|| build_classifier(architecture, &network, &device))
    }

    /// Same workflow with models from `new_model`, called once per fold
    pub fn execute_with<F>(&self, mut new_model: F) -> Result<CrossValidationReport>
    where
        F: FnMut() -> Box<dyn VolumeClassifier>,
    {
        let cfg = &self.config;
        cfg.validate().context("Invalid experiment configuration")?;
        let arch = cfg.architecture.name();

        // ── Step 1: Dataset index ─────────────────────────────────────────────
        tracing::info!("Scanning '{}' for classes {:?}", cfg.data_root.display(), cfg.classes);
        let (index, dataset) = cfg
            .open_dataset()
            .with_context(|| format!("Failed to open dataset at '{}'", cfg.data_root.display()))?;
        let classes = index.classes().clone();
        for (name, count) in classes.names().iter().zip(index.class_counts()) {
            tracing::info!("  {name}: {count} volumes");
        }

        // ── Step 2: Folds ─────────────────────────────────────────────────────
        let folds = stratified_k_fold(&index.labels(), cfg.folds, cfg.trainer.seed)
            .context("Failed to assign cross-validation folds")?;

        // ── Step 3: Effective config next to the results ──────────────────────
        cfg.save(&cfg.output_dir.join("config.json"))
            .context("Failed to write the effective config")?;

        // ── Step 4: Train and evaluate every fold ─────────────────────────────
        let metrics_dir = cfg.output_dir.join("metrics").join(arch);
        let evaluator = Evaluator::new(cfg.trainer.batch_size);
        let network = cfg.network_config();
        let mut summaries = Vec::with_capacity(folds.len());

        for split in &folds {
            let mut model = new_model();
            let checkpoints = CheckpointManager::for_fold(&cfg.output_dir, arch, split.fold)
                .with_context(|| format!("Fold {}: cannot create checkpoint dir", split.fold))?;
            checkpoints
                .save_config(NETWORK_SNAPSHOT, &network)
                .with_context(|| format!("Fold {}: cannot write the network snapshot", split.fold))?;
            let mut logger = MetricsLogger::for_fold(&metrics_dir, split.fold)
                .with_context(|| format!("Fold {}: cannot create metrics CSV", split.fold))?;

            let mut trainer = Trainer::new(cfg.trainer.clone())?;
            let outcome = trainer
                .fit(model.as_mut(), &dataset, split, &checkpoints, &mut logger)
                .with_context(|| format!("Fold {}: training failed", split.fold))?;

            let report = evaluator
                .evaluate(model.as_ref(), &dataset, &split.validation)
                .with_context(|| format!("Fold {}: evaluation failed", split.fold))?;

            tracing::info!(
                "Fold {} done: {:?} after {} epochs (best {}), accuracy={:.4}, macro_f1={:.4}",
                split.fold,
                outcome.final_state,
                outcome.epochs_run,
                outcome.best_epoch,
                report.metrics.accuracy,
                report.metrics.macro_f1
            );
            tracing::debug!("Fold {} per-class metrics:\n{}", split.fold, report.metrics.to_table(&classes));
            summaries.push(FoldSummary::new(split.fold, arch, &outcome, &report.metrics));
        }

        // ── Step 5: Aggregate ─────────────────────────────────────────────────
        let report = CrossValidationReport::new(arch, &classes, summaries);
        report
            .write(&report_dir(&cfg.output_dir, arch))
            .context("Failed to write the cross-validation report")?;
        Ok(report)
    }
}
