// (2+1)D residual network: every 3x3x3 convolution is factorised into
// a 1x3x3 in-plane convolution followed by a 3x1x1 convolution along
// the slice axis, each with its own BatchNorm and ReLU.
//
// Reference: Tran et al. (2018) A Closer Look at Spatiotemporal Convolutions

use burn::{prelude::*, tensor::activation::relu};

use super::{
    blocks::{global_avg_pool, ClassifierHead, ConvBnRelu},
    NetworkConfig, VolumeNetwork,
};

#[derive(Module, Debug)]
pub struct Conv2Plus1d<B: Backend> {
    pub spatial: ConvBnRelu<B>,
    pub depth:   ConvBnRelu<B>,
}

impl<B: Backend> Conv2Plus1d<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            spatial: ConvBnRelu::shaped(in_ch, out_ch, [1, 3, 3], [1, stride, stride], [0, 1, 1], device),
            depth:   ConvBnRelu::shaped(out_ch, out_ch, [3, 1, 1], [stride, 1, 1], [1, 0, 0], device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.depth.forward(self.spatial.forward(x))
    }

    fn forward_linear(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.depth.forward_linear(self.spatial.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct R2Plus1dBlock<B: Backend> {
    pub conv1:    Conv2Plus1d<B>,
    pub conv2:    Conv2Plus1d<B>,
    pub shortcut: Option<ConvBnRelu<B>>,
}

impl<B: Backend> R2Plus1dBlock<B> {
    fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv1: Conv2Plus1d::new(in_ch, out_ch, stride, device),
            conv2: Conv2Plus1d::new(out_ch, out_ch, 1, device),
            shortcut: (stride != 1 || in_ch != out_ch)
                .then(|| ConvBnRelu::cube(in_ch, out_ch, 1, stride, device)),
        }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let identity = match &self.shortcut {
            Some(proj) => proj.forward_linear(x.clone()),
            None => x.clone(),
        };
        relu(self.conv2.forward_linear(self.conv1.forward(x)) + identity)
    }
}

#[derive(Module, Debug)]
pub struct R2Plus1d<B: Backend> {
    pub stem:   Conv2Plus1d<B>,
    pub blocks: Vec<R2Plus1dBlock<B>>,
    pub head:   ClassifierHead<B>,
}

impl NetworkConfig {
    pub fn init_r2plus1d<B: Backend>(&self, device: &B::Device) -> R2Plus1d<B> {
        let c = self.base_channels;
        let stem = Conv2Plus1d::new(self.in_channels, c, 1, device);

        let mut blocks = Vec::new();
        let mut in_ch = c;
        for (i, width) in [c, 2 * c, 4 * c, 8 * c].into_iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            blocks.push(R2Plus1dBlock::new(in_ch, width, stride, device));
            in_ch = width;
        }

        let head = ClassifierHead::new(in_ch, self.num_classes, self.dropout, device);
        R2Plus1d { stem, blocks, head }
    }
}

impl<B: Backend> VolumeNetwork<B> for R2Plus1d<B> {
    fn features(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(volumes);
        for block in &self.blocks {
            x = block.forward(x);
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
            .init_r2plus1d::<TestBackend>(&Default::default());
        check_contract(&net, 32);
    }

    #[test]
    fn test_factorised_conv_downsamples_every_axis() {
        let device = Default::default();
        let conv = Conv2Plus1d::<TestBackend>::new(1, 4, 2, &device);
        let x = Tensor::<TestBackend, 5>::ones([1, 1, 6, 8, 8], &device);
        assert_eq!(conv.forward(x).dims(), [1, 4, 3, 4, 4]);
    }
}
