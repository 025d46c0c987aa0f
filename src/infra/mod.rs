// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// Cross-cutting concerns that touch the file system or other
// processes:
//
//   checkpoint.rs  → best-model weights per (architecture, fold)
//                    through the model's own save/load, plus the
//                    best-epoch record and JSON config snapshots
//
//   metrics.rs     → per-epoch metrics CSV, one file per fold
//
//   report.rs      → fold summaries, mean ± std across folds,
//                    classical-branch results table
//
//   fastsurfer.rs  → FastSurfer segmentation as a subprocess
//
// Reference: Rust Book §9 (Error Handling)
//            Burn Book §5 (Checkpointing)

/// Best-checkpoint bookkeeping
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Cross-validation and feature-branch reports
pub mod report;

/// External segmentation tool
pub mod fastsurfer;
