// ============================================================
// Layer 4: Volume Batcher (host → device)
// ============================================================
// Converts a host-side VolumeBatch into burn tensors on the
// target device:
//
//   volumes: Array5 (N, 1, D, H, W)  →  Tensor<B, 5>
//   labels:  Vec<usize> (N)          →  Tensor<B, 1, Int>
//
// The ndarray buffer is laid out in standard (row-major) order,
// which is the layout TensorData expects, so the flat Vec can be
// handed over without reordering.
//
// Reference: Burn Book §4 (Batcher)

use burn::{prelude::*, tensor::TensorData};

use crate::domain::batch::VolumeBatch;

/// A batch ready for the model forward pass
#[derive(Debug, Clone)]
pub struct VolumeTensorBatch<B: Backend> {
    /// Shape: [batch, channels, depth, height, width]
    pub volumes: Tensor<B, 5>,
    /// Shape: [batch], class indices
    pub targets: Tensor<B, 1, Int>,
}

/// Holds the target device so tensors are created in the right place
#[derive(Clone, Debug)]
pub struct VolumeBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> VolumeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: &VolumeBatch) -> VolumeTensorBatch<B> {
        let dims = batch.dims();

        // iter() walks in logical (row-major) order regardless of memory layout
        let flat: Vec<f32> = batch.volumes.iter().copied().collect();
        let volumes = Tensor::<B, 5>::from_data(TensorData::new(flat, dims), &self.device);

        let labels: Vec<i64> = batch.labels.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [dims[0]]), &self.device);

        VolumeTensorBatch { volumes, targets }
    }
}
