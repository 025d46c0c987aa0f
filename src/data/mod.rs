// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from a class-folder dataset on disk to batches the
// model can consume:
//
//   data_root/<class>/*.nii.gz
//       │
//       ▼
//   DatasetIndex          → ordered (path, label) pairs
//       │
//       ▼
//   stratified_k_fold     → disjoint train / validation indices
//       │
//       ▼
//   ClassBalancedSampler  → oversampled training order per epoch
//       │
//       ▼
//   VolumeDataset         → VolumeLoader → (ROI) → Preprocessor
//       │                   → (Augmenter, training only)
//       ▼
//   VolumeBatch           → host stack (domain layer)
//       │
//       ▼
//   VolumeBatcher         → burn tensors on the device
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Enumerates class folders into (path, label) pairs
pub mod index;

/// Stratified k-fold partitioning
pub mod splitter;

/// Reads NIfTI and MGH volumes
pub mod loader;

/// Percentile normalisation, foreground crop, trilinear resize
pub mod preprocessor;

/// Randomised training-time transforms
pub mod augmenter;

/// Anatomical region cropping from label volumes
pub mod roi;

/// Index entries + loading chain, parallel batch loading
pub mod dataset;

/// Oversampling of minority classes
pub mod sampler;

/// Host batches → burn tensors
pub mod batcher;

/// Thresholded voxel-wise difference, orthogonal slices
pub mod compare;
