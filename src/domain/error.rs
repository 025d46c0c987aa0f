// ============================================================
// Layer 3: Pipeline Error Categories
// ============================================================
// Each failure class has its own variant so callers can tell
// a bad config from a bad file from a diverged run:
//
//   Config       → fail fast before any training starts
//   Data         → one sample is unreadable or degenerate
//   Divergence   → a non-finite loss, always fatal
//   ExternalTool → FastSurfer (or another subprocess) failed
//   Checkpoint   → model weights could not be saved / restored
//
// The application and CLI layers wrap these in anyhow with
// extra context; the lower layers return them directly.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the data, ml and infra layers
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or inconsistent experiment configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A single volume could not be used
    #[error("data error in '{}': {reason}", path.display())]
    Data { path: PathBuf, reason: String },

    /// Training produced a NaN or infinite loss
    #[error("training diverged at epoch {epoch}: loss = {loss}")]
    Divergence { epoch: usize, loss: f64 },

    /// An external command exited unsuccessfully or could not be started
    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool:   String,
        status: String,
        stderr: String,
    },

    /// Saving or restoring model parameters failed
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// A tensor could not be moved back to host memory
    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn data(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Data { path: path.into(), reason: reason.into() }
    }

    /// True for per-sample failures that a lenient run may skip
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}
