// ============================================================
// Layer 5: Training Loop
// ============================================================
// One Trainer run fits one model on one fold:
//
//   Init ─► Training ─► Validating ─┬─► Training (next epoch)
//                                   ├─► EarlyStopped
//                                   └─► Completed (max_epochs reached)
//
// Per epoch:
//   1. ClassBalancedSampler draws the training order (with replacement)
//   2. samples are loaded with augmentation, seeded by
//      (run seed, epoch, position) so a rerun is reproducible
//   3. model.train_step per batch; a NaN / inf loss aborts the run
//      with PipelineError::Divergence
//   4. Evaluator pass over the validation fold (no augmentation,
//      no updates)
//   5. EarlyStopping / PlateauScheduler see the monitored metric;
//      an improvement overwrites the best checkpoint
//
// On either terminal state the best checkpoint is loaded back into
// the model, so callers always receive the best-epoch weights.
//
// All run state lives in local variables of `fit`; nothing is global.
//
// Reference: Burn Book §5, Prechelt (1998) Early Stopping - But When?

use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{LoadRequest, VolumeDataset},
    sampler::ClassBalancedSampler,
    splitter::FoldSplit,
};
use crate::domain::{
    batch::VolumeBatch,
    error::{PipelineError, PipelineResult},
    traits::VolumeClassifier,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, EpochSink},
};
use crate::ml::evaluator::Evaluator;

/// Which validation metric drives early stopping and LR reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    ValLoss,
    ValAccuracy,
    ValMacroF1,
}

impl Monitor {
    pub fn name(&self) -> &'static str {
        match self {
            Monitor::ValLoss     => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
            Monitor::ValMacroF1  => "val_macro_f1",
        }
    }

    pub fn minimize(&self) -> bool {
        matches!(self, Monitor::ValLoss)
    }

    pub fn value(&self, m: &EpochMetrics) -> f64 {
        match self {
            Monitor::ValLoss     => m.val_loss,
            Monitor::ValAccuracy => m.val_accuracy,
            Monitor::ValMacroF1  => m.val_macro_f1,
        }
    }

    /// Strictly better than `best` by more than `min_delta`
    fn improves(&self, value: f64, best: Option<f64>, min_delta: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match best {
            None => true,
            Some(b) if self.minimize() => value < b - min_delta,
            Some(b) => value > b + min_delta,
        }
    }
}

/// Training hyperparameters, part of the experiment config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub max_epochs:    usize,
    pub batch_size:    usize,
    pub learning_rate: f64,
    /// Epochs without improvement before stopping
    pub patience:      usize,
    pub min_delta:     f64,
    pub monitor:       Monitor,
    /// Learning-rate multiplier applied on a plateau
    pub lr_factor:     f64,
    pub lr_patience:   usize,
    pub min_lr:        f64,
    pub seed:          u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs:    50,
            batch_size:    4,
            learning_rate: 1e-4,
            patience:      10,
            min_delta:     0.0,
            monitor:       Monitor::ValLoss,
            lr_factor:     0.5,
            lr_patience:   5,
            min_lr:        1e-6,
            seed:          42,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::Config(msg));
        if self.max_epochs == 0 || self.batch_size == 0 {
            return fail(format!(
                "max_epochs and batch_size must be positive (got {}, {})",
                self.max_epochs, self.batch_size
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.patience == 0 || self.lr_patience == 0 {
            return fail("patience and lr_patience must be at least 1".into());
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return fail(format!("lr_factor must be in (0, 1), got {}", self.lr_factor));
        }
        if self.min_delta < 0.0 || self.min_lr < 0.0 {
            return fail("min_delta and min_lr must not be negative".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerState {
    Init,
    Training,
    Validating,
    EarlyStopped,
    Completed,
}

// ─── Early stopping ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor:    Monitor,
    patience:   usize,
    min_delta:  f64,
    best:       Option<f64>,
    best_epoch: usize,
    since_best: usize,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, patience: usize, min_delta: f64) -> Self {
        Self { monitor, patience, min_delta, best: None, best_epoch: 0, since_best: 0 }
    }

    /// Record one epoch's value; true if it is a new best.
    pub fn update(&mut self, epoch: usize, value: f64) -> bool {
        if self.monitor.improves(value, self.best, self.min_delta) {
            self.best = Some(value);
            self.best_epoch = epoch;
            self.since_best = 0;
            true
        } else {
            self.since_best += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.since_best >= self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

// ─── Reduce-on-plateau ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    monitor:       Monitor,
    learning_rate: f64,
    factor:        f64,
    patience:      usize,
    min_lr:        f64,
    best:          Option<f64>,
    wait:          usize,
}

impl PlateauScheduler {
    pub fn new(monitor: Monitor, learning_rate: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self { monitor, learning_rate, factor, patience, min_lr, best: None, wait: 0 }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Feed one epoch's monitored value and return the rate for the next epoch.
    pub fn step(&mut self, value: f64) -> f64 {
        if self.monitor.improves(value, self.best, 0.0) {
            self.best = Some(value);
            self.wait = 0;
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                let reduced = (self.learning_rate * self.factor).max(self.min_lr);
                if reduced < self.learning_rate {
                    tracing::info!("Plateau: learning rate {:.2e} → {:.2e}", self.learning_rate, reduced);
                }
                self.learning_rate = reduced;
                self.wait = 0;
            }
        }
        self.learning_rate
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub final_state: TrainerState,
    pub epochs_run:  usize,
    /// 0 when no epoch produced a finite monitored value
    pub best_epoch:  usize,
    pub best_score:  Option<f64>,
    pub history:     Vec<EpochMetrics>,
}

pub struct Trainer {
    config: TrainerConfig,
    state:  TrainerState,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config, state: TrainerState::Init })
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train `model` on `split.train`, validate on `split.validation`.
    pub fn fit(
        &mut self,
        model:       &mut dyn VolumeClassifier,
        dataset:     &VolumeDataset,
        split:       &FoldSplit,
        checkpoints: &CheckpointManager,
        sink:        &mut dyn EpochSink,
    ) -> PipelineResult<TrainOutcome> {
        self.state = TrainerState::Init;
        let cfg = self.config.clone();
        let run_seed = cfg.seed.wrapping_add(split.fold as u64);

        let train_labels = split
            .train
            .iter()
            .map(|&i| {
                dataset.label(i).ok_or_else(|| {
                    PipelineError::Config(format!("fold {} references missing sample {i}", split.fold))
                })
            })
            .collect::<PipelineResult<Vec<usize>>>()?;
        let sampler = ClassBalancedSampler::new(split.train.clone(), &train_labels, run_seed)?;
        let evaluator = Evaluator::new(cfg.batch_size);

        let mut early = EarlyStopping::new(cfg.monitor, cfg.patience, cfg.min_delta);
        let mut scheduler =
            PlateauScheduler::new(cfg.monitor, cfg.learning_rate, cfg.lr_factor, cfg.lr_patience, cfg.min_lr);
        let mut history = Vec::new();

        tracing::info!(
            "Fold {}: training {} on {} samples, validating on {}",
            split.fold,
            model.architecture(),
            split.train.len(),
            split.validation.len()
        );

        for epoch in 1..=cfg.max_epochs {
            // ── Training phase ────────────────────────────────────────────────
            self.state = TrainerState::Training;
            let lr = scheduler.learning_rate();
            let order = sampler.epoch_indices(epoch);

            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            for (b, chunk) in order.chunks(cfg.batch_size).enumerate() {
                let requests: Vec<LoadRequest> = chunk
                    .iter()
                    .enumerate()
                    .map(|(j, &idx)| (idx, Some(augment_seed(run_seed, epoch, b * cfg.batch_size + j))))
                    .collect();
                let samples = dataset.load_many(&requests)?;
                if samples.is_empty() {
                    continue;
                }
                let batch = VolumeBatch::from_samples(samples)?;
                let loss = model.train_step(&batch, lr)?;
                if !loss.is_finite() {
                    tracing::error!("Non-finite training loss at epoch {}, batch {}", epoch, b);
                    return Err(PipelineError::Divergence { epoch, loss });
                }
                loss_sum += loss;
                batches += 1;
            }
            if batches == 0 {
                return Err(PipelineError::Config(format!(
                    "epoch {epoch}: none of the training samples could be loaded"
                )));
            }

            // ── Validation phase ──────────────────────────────────────────────
            self.state = TrainerState::Validating;
            let report = evaluator.evaluate(&*model, dataset, &split.validation)?;

            let metrics = EpochMetrics {
                epoch,
                train_loss: loss_sum / batches as f64,
                val_loss: report.metrics.loss,
                val_accuracy: report.metrics.accuracy,
                val_macro_f1: report.metrics.macro_f1,
                learning_rate: lr,
            };
            sink.log(&metrics)?;

            let value = cfg.monitor.value(&metrics);
            let improved = early.update(epoch, value);
            if improved {
                checkpoints.save_best(&*model, epoch, cfg.monitor.name(), value)?;
            }
            scheduler.step(value);

            tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.1}% | val_f1={:.3}{}",
                epoch,
                cfg.max_epochs,
                metrics.train_loss,
                metrics.val_loss,
                metrics.val_accuracy * 100.0,
                metrics.val_macro_f1,
                if improved { " *" } else { "" },
            );
            history.push(metrics);

            if early.should_stop() {
                tracing::info!(
                    "Early stopping at epoch {} ({} epochs without improvement, best epoch {})",
                    epoch, cfg.patience, early.best_epoch()
                );
                self.state = TrainerState::EarlyStopped;
                break;
            }
        }

        if self.state != TrainerState::EarlyStopped {
            self.state = TrainerState::Completed;
        }

        if checkpoints.has_best() {
            checkpoints.load_best(model)?;
        } else {
            tracing::warn!("No epoch improved {}; keeping the last weights", cfg.monitor.name());
        }

        Ok(TrainOutcome {
            final_state: self.state,
            epochs_run: history.len(),
            best_epoch: early.best_epoch(),
            best_score: early.best(),
            history,
        })
    }
}

/// Per-sample augmentation seed
fn augment_seed(run_seed: u64, epoch: usize, position: usize) -> u64 {
    run_seed
        ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (position as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}
