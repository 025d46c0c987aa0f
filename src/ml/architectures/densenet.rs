// ============================================================
// DenseNet-style 3D network
// ============================================================
// Inside a dense block every layer sees the concatenation of all
// earlier outputs:
//
//   x0 → L1 → cat(x0, y1) → L2 → cat(x0, y1, y2) → ...
//
// Each layer adds `growth` channels (1x1x1 bottleneck to 4·growth,
// then 3x3x3 to growth). Transitions between blocks halve both the
// channel count and every spatial axis.
//
// Reference: Huang et al. (2017) Densely Connected Convolutional Networks

use burn::prelude::*;

use super::{
    blocks::{global_avg_pool, ClassifierHead, ConvBnRelu},
    NetworkConfig, VolumeNetwork,
};

const BLOCKS: usize = 3;
const LAYERS_PER_BLOCK: usize = 2;

#[derive(Module, Debug)]
pub struct DenseLayer3d<B: Backend> {
    pub bottleneck: ConvBnRelu<B>,
    pub conv:       ConvBnRelu<B>,
}

impl<B: Backend> DenseLayer3d<B> {
    fn new(in_ch: usize, growth: usize, device: &B::Device) -> Self {
        Self {
            bottleneck: ConvBnRelu::cube(in_ch, 4 * growth, 1, 1, device),
            conv:       ConvBnRelu::cube(4 * growth, growth, 3, 1, device),
        }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let new = self.conv.forward(self.bottleneck.forward(x.clone()));
        Tensor::cat(vec![x, new], 1)
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock3d<B: Backend> {
    pub layers:     Vec<DenseLayer3d<B>>,
    /// Absent after the last block
    pub transition: Option<ConvBnRelu<B>>,
}

#[derive(Module, Debug)]
pub struct DenseNet3d<B: Backend> {
    pub stem:   ConvBnRelu<B>,
    pub blocks: Vec<DenseBlock3d<B>>,
    pub head:   ClassifierHead<B>,
}

impl NetworkConfig {
    pub fn init_densenet<B: Backend>(&self, device: &B::Device) -> DenseNet3d<B> {
        let growth = self.base_channels;
        let mut channels = 2 * self.base_channels;
        let stem = ConvBnRelu::cube(self.in_channels, channels, 3, 1, device);

        let mut blocks = Vec::with_capacity(BLOCKS);
        for b in 0..BLOCKS {
            let mut layers = Vec::with_capacity(LAYERS_PER_BLOCK);
            for _ in 0..LAYERS_PER_BLOCK {
                layers.push(DenseLayer3d::new(channels, growth, device));
                channels += growth;
            }
            let transition = (b + 1 < BLOCKS).then(|| {
                let out = channels / 2;
                let t = ConvBnRelu::cube(channels, out, 3, 2, device);
                channels = out;
                t
            });
            blocks.push(DenseBlock3d { layers, transition });
        }

        let head = ClassifierHead::new(channels, self.num_classes, self.dropout, device);
        DenseNet3d { stem, blocks, head }
    }
}

impl<B: Backend> VolumeNetwork<B> for DenseNet3d<B> {
    fn features(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(volumes);
        for block in &self.blocks {
            for layer in &block.layers {
                x = layer.forward(x);
            }
            if let Some(t) = &block.transition {
                x = t.forward(x);
            }
        }
        global_avg_pool(x)
    }

    fn head(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.head.forward(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::architectures::tests::{check_contract, TestBackend};

    #[test]
    fn test_output_shapes() {
        // 8 → +8 = 16 → /2 = 8 → +8 = 16 → /2 = 8 → +8 = 16
        let net = NetworkConfig::new(3)
            .with_base_channels(4)
            .init_densenet::<TestBackend>(&Default::default());
        check_contract(&net, 16);
    }

    #[test]
    fn test_dense_layer_appends_growth_channels() {
        let device = Default::default();
        let layer = DenseLayer3d::<TestBackend>::new(6, 3, &device);
        let x = Tensor::<TestBackend, 5>::ones([1, 6, 4, 4, 4], &device);
        assert_eq!(layer.forward(x).dims(), [1, 9, 4, 4, 4]);
    }
}
