// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust types and traits that describe an experiment:
// class labels, samples, batches, error categories and the
// model capability set the rest of the pipeline programs against.
//
// Rules for this layer:
//   - NO burn types here (tensors live in Layer 5)
//   - NO file I/O
//   - ndarray is allowed: volumes and logits are host arrays
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Class labels and loaded samples
pub mod sample;

// Stacked mini-batches
pub mod batch;

// Error categories shared by every layer
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
