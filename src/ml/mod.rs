// ============================================================
// Layer 5: ML / Model Layer
// ============================================================
// All burn-specific code lives in `architectures` and `classifier`.
// Everything else in this layer talks to models through the
// VolumeClassifier trait and works on host ndarrays, so the
// training loop, the metrics and the classical branch are testable
// without building a network.
//
// What's in this layer:
//
//   architectures/     → five 3D CNN families (burn modules)
//                        BasicCnn3d, DenseNet3d, Inception3d,
//                        ResNet3d, R2Plus1d + shared blocks
//
//   classifier.rs      → BurnClassifier: Autodiff backend, Adam,
//                        cross-entropy, CompactRecorder checkpoints
//
//   trainer.rs         → epoch loop, early stopping, LR plateau
//                        schedule, divergence detection
//
//   evaluator.rs       → accuracy / P / R / F1 / AUC / confusion
//
//   feature_extractor  → penultimate-layer features per subject
//
//   classical/         → eight conventional classifiers, feature
//                        scaling and grid search
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// 3D network families
pub mod architectures;

/// Burn-backed VolumeClassifier and the architecture factory
pub mod classifier;

/// Training loop with early stopping and checkpointing
pub mod trainer;

/// Classification metrics over a held-out subset
pub mod evaluator;

/// Deep features for the classical branch
pub mod feature_extractor;

/// Conventional classifiers on extracted features
pub mod classical;
