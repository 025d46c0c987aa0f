// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The Trainer, Evaluator and Feature Extractor are written
// against these traits only, so they never know which network
// family (or which file format) sits behind them.
//
//   VolumeSource      ← VolumeLoader (data layer)
//   VolumeClassifier  ← BurnClassifier<B, M, O> for the five
//                       architecture families (ml layer), and
//                       small scripted models in tests
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Trait Objects)

use std::path::Path;

use ndarray::{Array2, Array3};

use crate::domain::batch::VolumeBatch;
use crate::domain::error::PipelineResult;

// ─── VolumeSource ─────────────────────────────────────────────────────────────
/// Anything that can turn a file path into a raw 3D intensity array.
pub trait VolumeSource: Send + Sync {
    /// Read one volume. Unparseable files and degenerate shapes are
    /// reported as `PipelineError::Data`.
    fn load(&self, path: &Path) -> PipelineResult<Array3<f32>>;
}

// ─── VolumeClassifier ─────────────────────────────────────────────────────────
/// The capability set shared by every model family.
///
/// Input batches are (batch, channels, depth, height, width); logits
/// and features come back as (batch, n) host arrays.
pub trait VolumeClassifier {
    /// Stable architecture name, used to key checkpoints
    fn architecture(&self) -> &str;

    fn num_classes(&self) -> usize;

    /// Forward + backward + one optimiser step. Returns the mean loss of
    /// the batch; the caller decides what a non-finite value means.
    fn train_step(&mut self, batch: &VolumeBatch, learning_rate: f64) -> PipelineResult<f64>;

    /// Per-class logits without touching parameters
    fn predict(&self, batch: &VolumeBatch) -> PipelineResult<Array2<f32>>;

    /// Activations of the fixed penultimate layer, one row per sample
    fn features(&self, batch: &VolumeBatch) -> PipelineResult<Array2<f32>>;

    /// Write the learned parameters to `path` (extension chosen by the model)
    fn save(&self, path: &Path) -> PipelineResult<()>;

    /// Replace the learned parameters with the ones stored at `path`
    fn load(&mut self, path: &Path) -> PipelineResult<()>;
}
