// ============================================================
// ResNet-style 3D network
// ============================================================
//   stem → [c] → [2c, /2] → [4c, /2] → [8c, /2] → GAP → head
//
// Each stage is one basic block:
//   y = relu( BN(conv3(relu(BN(conv3(x))))) + shortcut(x) )
// where the shortcut is a 1x1x1 projection whenever the stride or
// channel count changes and the identity otherwise.
//
// Reference: He et al. (2016) Deep Residual Learning

use burn::{prelude::*, tensor::activation::relu};

use super::{
    blocks::{global_avg_pool, ClassifierHead, ConvBnRelu},
    NetworkConfig, VolumeNetwork,
};

#[derive(Module, Debug)]
pub struct BasicBlock3d<B: Backend> {
    pub conv1:    ConvBnRelu<B>,
    pub conv2:    ConvBnRelu<B>,
    pub shortcut: Option<ConvBnRelu<B>>,
}

impl<B: Backend> BasicBlock3d<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = (stride != 1 || in_ch != out_ch)
            .then(|| ConvBnRelu::cube(in_ch, out_ch, 1, stride, device));
        Self {
            conv1: ConvBnRelu::cube(in_ch, out_ch, 3, stride, device),
            conv2: ConvBnRelu::cube(out_ch, out_ch, 3, 1, device),
            shortcut,
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let identity = match &self.shortcut {
            Some(proj) => proj.forward_linear(x.clone()),
            None => x.clone(),
        };
        let out = self.conv2.forward_linear(self.conv1.forward(x));
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet3d<B: Backend> {
    pub stem:   ConvBnRelu<B>,
    pub blocks: Vec<BasicBlock3d<B>>,
    pub head:   ClassifierHead<B>,
}

impl NetworkConfig {
    pub fn init_resnet<B: Backend>(&self, device: &B::Device) -> ResNet3d<B> {
        let c = self.base_channels;
        let stem = ConvBnRelu::cube(self.in_channels, c, 3, 1, device);

        let mut blocks = Vec::new();
        let mut in_ch = c;
        for (i, width) in [c, 2 * c, 4 * c, 8 * c].into_iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            blocks.push(BasicBlock3d::new(in_ch, width, stride, device));
            in_ch = width;
        }

        let head = ClassifierHead::new(in_ch, self.num_classes, self.dropout, device);
        ResNet3d { stem, blocks, head }
    }
}

impl<B: Backend> VolumeNetwork<B> for ResNet3d<B> {
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
            .init_resnet::<TestBackend>(&Default::default());
        check_contract(&net, 32);
    }

    #[test]
    fn test_projection_only_where_shape_changes() {
        let device = Default::default();
        let same = BasicBlock3d::<TestBackend>::new(4, 4, 1, &device);
        let down = BasicBlock3d::<TestBackend>::new(4, 8, 2, &device);
        assert!(same.shortcut.is_none());
        assert!(down.shortcut.is_some());

        let x = Tensor::<TestBackend, 5>::ones([1, 4, 6, 6, 6], &device);
        assert_eq!(down.forward(x).dims(), [1, 8, 3, 3, 3]);
    }
}
