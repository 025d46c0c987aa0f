// Plain strided convolution stack: stem, then three stages that each
// halve every spatial axis and double the channel count.

use burn::prelude::*;

use super::{
    blocks::{global_avg_pool, ClassifierHead, ConvBnRelu},
    NetworkConfig, VolumeNetwork,
};

#[derive(Module, Debug)]
pub struct BasicCnn3d<B: Backend> {
    pub stem:   ConvBnRelu<B>,
    pub stages: Vec<CnnStage<B>>,
    pub head:   ClassifierHead<B>,
}

#[derive(Module, Debug)]
pub struct CnnStage<B: Backend> {
    pub down:   ConvBnRelu<B>,
    pub refine: ConvBnRelu<B>,
}

impl<B: Backend> CnnStage<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.refine.forward(self.down.forward(x))
    }
}

impl NetworkConfig {
    pub fn init_basic_cnn<B: Backend>(&self, device: &B::Device) -> BasicCnn3d<B> {
        let c = self.base_channels;
        let stem = ConvBnRelu::cube(self.in_channels, c, 3, 1, device);

        let widths = [c, 2 * c, 4 * c, 8 * c];
        let stages = widths
            .windows(2)
            .map(|w| CnnStage {
                down:   ConvBnRelu::cube(w[0], w[1], 3, 2, device),
                refine: ConvBnRelu::cube(w[1], w[1], 3, 1, device),
            })
            .collect();

        let head = ClassifierHead::new(8 * c, self.num_classes, self.dropout, device);
        BasicCnn3d { stem, stages, head }
    }
}

impl<B: Backend> VolumeNetwork<B> for BasicCnn3d<B> {
    fn features(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(volumes);
        for stage in &self.stages {
            x = stage.forward(x);
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
        let net = NetworkConfig::new(3)
            .with_base_channels(4)
            .init_basic_cnn::<TestBackend>(&Default::default());
        check_contract(&net, 32);
    }
}
