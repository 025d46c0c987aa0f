// ============================================================
// Layer 5: 3D Network Families
// ============================================================
// Five interchangeable classifiers with one contract:
//
//   input:    [batch, channels, depth, height, width]
//   features: [batch, feature_dim]   (pooled penultimate layer)
//   logits:   [batch, num_classes]
//
//   basic_cnn    → plain strided conv stack
//   densenet3d   → dense blocks with channel concatenation
//   inception3d  → parallel 1/3/5-receptive-field branches
//   resnet3d     → residual basic blocks
//   r2plus1d     → (2+1)D factorised spatial/depth convolutions
//
// The Trainer and Evaluator never see these types; they talk to
// BurnClassifier through the VolumeClassifier trait.
//
// Reference: Burn Book §3 (Building Blocks)

use std::{fmt, str::FromStr};

use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub mod blocks;
pub mod basic_cnn;
pub mod densenet;
pub mod inception;
pub mod resnet;
pub mod r2plus1d;

pub use basic_cnn::BasicCnn3d;
pub use densenet::DenseNet3d;
pub use inception::Inception3d;
pub use r2plus1d::R2Plus1d;
pub use resnet::ResNet3d;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct NetworkConfig {
    pub num_classes: usize,
    #[config(default = 1)]
    pub in_channels: usize,
    /// Width of the first stage; later stages are multiples of it
    #[config(default = 16)]
    pub base_channels: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

/// The capability every family provides to BurnClassifier
pub trait VolumeNetwork<B: Backend> {
    /// Pooled activations of the penultimate layer
    fn features(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2>;

    /// Classification head applied to `features`
    fn head(&self, features: Tensor<B, 2>) -> Tensor<B, 2>;

    fn forward(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2> {
        self.head(self.features(volumes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    BasicCnn,
    #[serde(rename = "densenet3d")]
    DenseNet3d,
    #[serde(rename = "inception3d")]
    Inception3d,
    #[serde(rename = "resnet3d")]
    ResNet3d,
    #[serde(rename = "r2plus1d")]
    R2Plus1d,
}

impl Architecture {
    pub const ALL: [Architecture; 5] = [
        Architecture::BasicCnn,
        Architecture::DenseNet3d,
        Architecture::Inception3d,
        Architecture::ResNet3d,
        Architecture::R2Plus1d,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::BasicCnn    => "basic_cnn",
            Architecture::DenseNet3d  => "densenet3d",
            Architecture::Inception3d => "inception3d",
            Architecture::ResNet3d    => "resnet3d",
            Architecture::R2Plus1d    => "r2plus1d",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalise(s);
        Architecture::ALL
            .into_iter()
            .find(|a| normalise(a.name()) == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown architecture '{s}' (expected one of: {})",
                    Architecture::ALL.map(|a| a.name()).join(", ")
                )
            })
    }
}

/// "R(2+1)D", "r2plus1d" and "R2+1D" all compare equal
fn normalise(name: &str) -> String {
    name.to_ascii_lowercase()
        .replace("2+1", "2plus1")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    pub(crate) type TestBackend = NdArray<f32>;

    pub(crate) fn check_contract<N: VolumeNetwork<TestBackend>>(net: &N, feature_dim: usize) {
        let device = Default::default();
        let x = Tensor::<TestBackend, 5>::ones([2, 1, 8, 12, 12], &device);
        let features = net.features(x.clone());
        assert_eq!(features.dims(), [2, feature_dim]);
        let logits = net.forward(x);
        assert_eq!(logits.dims(), [2, 3]);
        let values = logits.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_parse_architecture_names() {
        assert_eq!("resnet3d".parse::<Architecture>().unwrap(), Architecture::ResNet3d);
        assert_eq!("R(2+1)D".parse::<Architecture>().unwrap(), Architecture::R2Plus1d);
        assert_eq!("basic-cnn".parse::<Architecture>().unwrap(), Architecture::BasicCnn);
        assert_eq!("DenseNet3D".parse::<Architecture>().unwrap(), Architecture::DenseNet3d);
        assert!("vgg".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        for arch in Architecture::ALL {
            let json = serde_json::to_string(&arch).unwrap();
            assert_eq!(json, format!("\"{}\"", arch.name()));
        }
    }
}
