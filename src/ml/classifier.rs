// ============================================================
// Layer 5: Burn-backed Volume Classifier
// ============================================================
// Adapts any of the five network families to the
// VolumeClassifier trait:
//
//   train_step:  batch → Autodiff tensors → logits → CE loss
//                → backward → Adam step
//   predict:     model.valid() (dropout off, BN running stats)
//                → logits on the inner backend → host Array2
//   features:    same as predict, stopping at the pooled layer
//   save / load: CompactRecorder (.mpk.gz)
//
// Training uses TrainBackend (Autodiff<...>); evaluation strips the
// autodiff wrapper with .valid() / .inner() so no graph is built.
//
// Reference: Burn Book §5 (Training), Kingma & Ba (2015) Adam

use std::path::Path;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use ndarray::Array2;

use crate::data::batcher::VolumeBatcher;
use crate::domain::{
    batch::VolumeBatch,
    error::{PipelineError, PipelineResult},
    traits::VolumeClassifier,
};
use crate::ml::architectures::{Architecture, NetworkConfig, VolumeNetwork};

#[cfg(not(feature = "wgpu"))]
pub type ComputeBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
pub type ComputeBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<ComputeBackend>;
pub type TrainDevice = <TrainBackend as Backend>::Device;

pub struct BurnClassifier<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + VolumeNetwork<B>,
    M::InnerModule: VolumeNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    architecture: Architecture,
    num_classes:  usize,
    model:        M,
    optim:        O,
    batcher:      VolumeBatcher<B>,
    device:       B::Device,
}

impl<B, M, O> BurnClassifier<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + VolumeNetwork<B>,
    M::InnerModule: VolumeNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    pub fn new(architecture: Architecture, num_classes: usize, model: M, optim: O, device: B::Device) -> Self {
        Self {
            architecture,
            num_classes,
            model,
            optim,
            batcher: VolumeBatcher::new(device.clone()),
            device,
        }
    }

    fn inner_volumes(&self, batch: &VolumeBatch) -> Tensor<B::InnerBackend, 5> {
        self.batcher.batch(batch).volumes.inner()
    }
}

impl<B, M, O> VolumeClassifier for BurnClassifier<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + VolumeNetwork<B>,
    M::InnerModule: VolumeNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    fn architecture(&self) -> &str {
        self.architecture.name()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn train_step(&mut self, batch: &VolumeBatch, learning_rate: f64) -> PipelineResult<f64> {
        let tensors = self.batcher.batch(batch);
        let logits = self.model.forward(tensors.volumes);
        let loss = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits, tensors.targets);

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            // Parameters stay untouched; the Trainer reports the divergence
            return Ok(loss_val);
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(learning_rate, self.model.clone(), grads);
        Ok(loss_val)
    }

    fn predict(&self, batch: &VolumeBatch) -> PipelineResult<Array2<f32>> {
        let logits = self.model.valid().forward(self.inner_volumes(batch));
        to_host(logits)
    }

    fn features(&self, batch: &VolumeBatch) -> PipelineResult<Array2<f32>> {
        let features = self.model.valid().features(self.inner_volumes(batch));
        to_host(features)
    }

    fn save(&self, path: &Path) -> PipelineResult<()> {
        CompactRecorder::new()
            .record(self.model.clone().into_record(), path.to_path_buf())
            .map_err(|e| PipelineError::Checkpoint(format!("cannot save '{}': {e}", path.display())))?;
        tracing::debug!("Saved {} weights to '{}'", self.architecture, path.display());
        Ok(())
    }

    fn load(&mut self, path: &Path) -> PipelineResult<()> {
        let record: M::Record = CompactRecorder::new()
            .load(path.to_path_buf(), &self.device)
            .map_err(|e| PipelineError::Checkpoint(format!("cannot load '{}': {e}", path.display())))?;
        self.model = self.model.clone().load_record(record);
        tracing::debug!("Restored {} weights from '{}'", self.architecture, path.display());
        Ok(())
    }
}

/// [rows, cols] tensor → host Array2
fn to_host<B: Backend>(tensor: Tensor<B, 2>) -> PipelineResult<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PipelineError::Tensor(format!("{e:?}")))?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| PipelineError::Tensor(e.to_string()))
}

fn boxed<M>(architecture: Architecture, num_classes: usize, model: M, device: &TrainDevice) -> Box<dyn VolumeClassifier>
where
    M: AutodiffModule<TrainBackend> + VolumeNetwork<TrainBackend> + 'static,
    M::InnerModule: VolumeNetwork<ComputeBackend>,
{
    // m = β1*m + (1-β1)*g ; v = β2*v + (1-β2)*g² ; θ -= lr * m / (√v + ε)
    let optim = AdamConfig::new().with_epsilon(1e-8).init::<TrainBackend, M>();
    Box::new(BurnClassifier::new(architecture, num_classes, model, optim, device.clone()))
}

/// Build a freshly initialised classifier of the requested family
pub fn build_classifier(
    architecture: Architecture,
    config: &NetworkConfig,
    device: &TrainDevice,
) -> Box<dyn VolumeClassifier> {
    let n = config.num_classes;
    tracing::debug!(
        "Building {} (base_channels={}, dropout={})",
        architecture, config.base_channels, config.dropout
    );
    match architecture {
        Architecture::BasicCnn    => boxed(architecture, n, config.init_basic_cnn::<TrainBackend>(device), device),
        Architecture::DenseNet3d  => boxed(architecture, n, config.init_densenet::<TrainBackend>(device), device),
        Architecture::Inception3d => boxed(architecture, n, config.init_inception::<TrainBackend>(device), device),
        Architecture::ResNet3d    => boxed(architecture, n, config.init_resnet::<TrainBackend>(device), device),
        Architecture::R2Plus1d    => boxed(architecture, n, config.init_r2plus1d::<TrainBackend>(device), device),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::Sample;
    use crate::test_support::scratch_dir;
    use ndarray::Array3;

    fn tiny_batch() -> VolumeBatch {
        let samples = (0..2)
            .map(|i| Sample {
                id: format!("s{i}"),
                label: i,
                volume: Array3::from_shape_fn((8, 8, 8), |(z, y, x)| ((z + y + x + i) % 5) as f32 / 5.0),
            })
            .collect();
        VolumeBatch::from_samples(samples).unwrap()
    }

    fn tiny_config() -> NetworkConfig {
        NetworkConfig::new(3).with_base_channels(2).with_dropout(0.0)
    }

    #[test]
    fn test_every_architecture_trains_and_predicts() {
        let device = TrainDevice::default();
        let batch = tiny_batch();
        for arch in Architecture::ALL {
            let mut model = build_classifier(arch, &tiny_config(), &device);
            assert_eq!(model.architecture(), arch.name());
            assert_eq!(model.num_classes(), 3);

            let loss = model.train_step(&batch, 1e-3).unwrap();
            assert!(loss.is_finite() && loss > 0.0, "{arch}: loss {loss}");

            let logits = model.predict(&batch).unwrap();
            assert_eq!(logits.dim(), (2, 3));
            let features = model.features(&batch).unwrap();
            assert_eq!(features.nrows(), 2);
        }
    }

    #[test]
    fn test_predict_is_deterministic() {
        let device = TrainDevice::default();
        let model = build_classifier(Architecture::BasicCnn, &tiny_config(), &device);
        let batch = tiny_batch();
        assert_eq!(model.predict(&batch).unwrap(), model.predict(&batch).unwrap());
    }

    #[test]
    fn test_save_then_load_restores_predictions() {
        let device = TrainDevice::default();
        let batch = tiny_batch();
        let dir = scratch_dir("classifier_ckpt");
        let path = dir.join("best");

        let mut trained = build_classifier(Architecture::ResNet3d, &tiny_config(), &device);
        trained.train_step(&batch, 1e-2).unwrap();
        trained.save(&path).unwrap();
        assert!(dir.join("best.mpk").is_file());
        let expected = trained.predict(&batch).unwrap();

        let mut fresh = build_classifier(Architecture::ResNet3d, &tiny_config(), &device);
        fresh.load(&path).unwrap();
        let restored = fresh.predict(&batch).unwrap();

        // CompactRecorder stores half precision
        for (a, b) in expected.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 5e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn test_load_missing_checkpoint_is_an_error() {
        let device = TrainDevice::default();
        let mut model = build_classifier(Architecture::BasicCnn, &tiny_config(), &device);
        let err = model.load(&scratch_dir("classifier_missing").join("nope")).unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint(_)));
    }
}
