// ============================================================
// Layer 6: Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch, one
// file per fold so folds can be plotted side by side.
//
// Metrics recorded per epoch:
//   - epoch:         the epoch number (1, 2, 3, ...)
//   - train_loss:    mean cross-entropy over the training batches
//   - val_loss:      cross-entropy on the validation fold
//   - val_accuracy:  fraction of validation samples classified correctly
//   - val_macro_f1:  unweighted mean of per-class F1
//   - learning_rate: the rate used for this epoch's updates
//
// Output file: {output}/metrics/{architecture}/metrics_fold_{k}.csv
//
// Example CSV output:
//   epoch,train_loss,val_loss,val_accuracy,val_macro_f1,learning_rate
//   1,1.104500,1.089200,0.366667,0.301000,0.000100
//   2,1.010100,1.054300,0.433333,0.398000,0.000100
//   ...
//
// How to read the metrics:
//   - val_loss rising while train_loss falls → overfitting; early
//     stopping will cut the run `patience` epochs later
//   - a step down in learning_rate marks a plateau reduction
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineResult;

const HEADER: &str = "epoch,train_loss,val_loss,val_accuracy,val_macro_f1,learning_rate";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average cross-entropy loss over all training batches
    pub train_loss: f64,

    pub val_loss: f64,

    /// Range: [0.0, 1.0]
    pub val_accuracy: f64,

    pub val_macro_f1: f64,

    pub learning_rate: f64,
}

/// Sink for per-epoch metrics. The Trainer only needs `log`.
pub trait EpochSink {
    fn log(&mut self, metrics: &EpochMetrics) -> PipelineResult<()>;
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
    history:  Vec<EpochMetrics>,
}

impl MetricsLogger {
    /// Start `metrics_fold_{fold}.csv` in `dir`. An existing file from an
    /// earlier run of the same fold is replaced.
    pub fn for_fold(dir: &Path, fold: usize) -> PipelineResult<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(format!("metrics_fold_{fold}.csv"));

        let mut f = fs::File::create(&csv_path)?;
        writeln!(f, "{HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path, history: Vec::new() })
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Every row logged so far, in order
    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }
}

impl EpochSink for MetricsLogger {
    /// Append one epoch's metrics as a new row in the CSV.
    fn log(&mut self, m: &EpochMetrics) -> PipelineResult<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.val_loss, m.val_accuracy, m.val_macro_f1, m.learning_rate,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch, m.train_loss, m.val_loss,
        );
        self.history.push(m.clone());
        Ok(())
    }
}

/// In-memory sink, for runs that should not touch disk
impl EpochSink for Vec<EpochMetrics> {
    fn log(&mut self, metrics: &EpochMetrics) -> PipelineResult<()> {
        self.push(metrics.clone());
        Ok(())
    }
}
