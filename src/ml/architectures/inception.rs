// ============================================================
// Inception-style 3D network
// ============================================================
// Every inception module runs four branches in parallel and
// concatenates them along the channel axis:
//
//   ┌─ 1x1x1 ──────────────────────┐
//   ├─ 1x1x1 → 3x3x3 ──────────────┤
//   ├─ 1x1x1 → 3x3x3 → 3x3x3 ──────┼─ cat → 4·width channels
//   └─ 3x3x3 ──────────────────────┘
//
// A strided 3x3x3 reduction follows each module.
//
// Reference: Szegedy et al. (2016) Rethinking the Inception Architecture

use burn::prelude::*;

use super::{
    blocks::{global_avg_pool, ClassifierHead, ConvBnRelu},
    NetworkConfig, VolumeNetwork,
};

#[derive(Module, Debug)]
pub struct InceptionModule3d<B: Backend> {
    pub point:  ConvBnRelu<B>,
    pub single: Vec<ConvBnRelu<B>>,
    pub double: Vec<ConvBnRelu<B>>,
    pub wide:   ConvBnRelu<B>,
    pub width:  usize,
}

impl<B: Backend> InceptionModule3d<B> {
    pub fn new(in_ch: usize, width: usize, device: &B::Device) -> Self {
        Self {
            point: ConvBnRelu::cube(in_ch, width, 1, 1, device),
            single: vec![
                ConvBnRelu::cube(in_ch, width, 1, 1, device),
                ConvBnRelu::cube(width, width, 3, 1, device),
            ],
            double: vec![
                ConvBnRelu::cube(in_ch, width, 1, 1, device),
                ConvBnRelu::cube(width, width, 3, 1, device),
                ConvBnRelu::cube(width, width, 3, 1, device),
            ],
            wide: ConvBnRelu::cube(in_ch, width, 3, 1, device),
            width,
        }
    }

    pub fn out_channels(&self) -> usize {
        4 * self.width
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let chain = |layers: &[ConvBnRelu<B>], x: Tensor<B, 5>| {
            layers.iter().fold(x, |acc, layer| layer.forward(acc))
        };
        let branches = vec![
            self.point.forward(x.clone()),
            chain(&self.single, x.clone()),
            chain(&self.double, x.clone()),
            self.wide.forward(x),
        ];
        Tensor::cat(branches, 1)
    }
}

#[derive(Module, Debug)]
pub struct Inception3d<B: Backend> {
    pub stem:       ConvBnRelu<B>,
    pub blocks:     Vec<InceptionModule3d<B>>,
    pub reductions: Vec<ConvBnRelu<B>>,
    pub head:       ClassifierHead<B>,
}

impl NetworkConfig {
    pub fn init_inception<B: Backend>(&self, device: &B::Device) -> Inception3d<B> {
        let c = self.base_channels;
        let stem = ConvBnRelu::cube(self.in_channels, c, 3, 1, device);

        let mut blocks = Vec::new();
        let mut reductions = Vec::new();
        let mut in_ch = c;
        for width in [c, 2 * c] {
            let module = InceptionModule3d::new(in_ch, width, device);
            let out = module.out_channels();
            reductions.push(ConvBnRelu::cube(out, out, 3, 2, device));
            blocks.push(module);
            in_ch = out;
        }

        let head = ClassifierHead::new(in_ch, self.num_classes, self.dropout, device);
        Inception3d { stem, blocks, reductions, head }
    }
}

impl<B: Backend> VolumeNetwork<B> for Inception3d<B> {
    fn features(&self, volumes: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(volumes);
        for (module, reduce) in self.blocks.iter().zip(&self.reductions) {
            x = reduce.forward(module.forward(x));
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
            .init_inception::<TestBackend>(&Default::default());
        check_contract(&net, 32);
    }

    #[test]
    fn test_module_concatenates_four_branches() {
        let device = Default::default();
        let module = InceptionModule3d::<TestBackend>::new(2, 5, &device);
        assert_eq!(module.out_channels(), 20);
        let x = Tensor::<TestBackend, 5>::ones([1, 2, 4, 4, 4], &device);
        assert_eq!(module.forward(x).dims(), [1, 20, 4, 4, 4]);
    }
}
