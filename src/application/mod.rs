// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per use case: train and evaluate a network, run the
// classical branch on its features, segment the raw scans or
// compare two scans.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Errors are wrapped in anyhow with context
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Experiment configuration file
pub mod config;

// k-fold training + evaluation of one architecture
pub mod cross_validate_use_case;

// Deep features + classical classifiers
pub mod feature_use_case;

// FastSurfer over the dataset index
pub mod segment_use_case;

// Thresholded difference of two scans
pub mod compare_use_case;
