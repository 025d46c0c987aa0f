// Building blocks shared by the five network families.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Conv3d → BatchNorm → ReLU
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    pub conv: Conv3d<B>,
    pub norm: BatchNorm<B, 3>,
}

impl<B: Backend> ConvBnRelu<B> {
    /// Cubic kernel, "same" padding for odd kernels
    pub fn cube(in_ch: usize, out_ch: usize, kernel: usize, stride: usize, device: &B::Device) -> Self {
        let pad = kernel / 2;
        Self::shaped(in_ch, out_ch, [kernel; 3], [stride; 3], [pad; 3], device)
    }

    pub fn shaped(
        in_ch:   usize,
        out_ch:  usize,
        kernel:  [usize; 3],
        stride:  [usize; 3],
        padding: [usize; 3],
        device:  &B::Device,
    ) -> Self {
        let conv = Conv3dConfig::new([in_ch, out_ch], kernel)
            .with_stride(stride)
            .with_padding(PaddingConfig3d::Explicit(padding[0], padding[1], padding[2]))
            .with_bias(false)
            .init(device);
        let norm = BatchNormConfig::new(out_ch).init(device);
        Self { conv, norm }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        relu(self.forward_linear(x))
    }

    /// Conv + BatchNorm without the activation (residual branches)
    pub fn forward_linear(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.norm.forward(self.conv.forward(x))
    }
}

/// Dropout → Linear over pooled features
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub dropout: Dropout,
    pub linear:  Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(in_features: usize, num_classes: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            dropout: DropoutConfig::new(dropout).init(),
            linear:  LinearConfig::new(in_features, num_classes).init(device),
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(self.dropout.forward(features))
    }
}

/// [N, C, D, H, W] → [N, C]
pub fn global_avg_pool<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 2> {
    let [n, c, _, _, _] = x.dims();
    x.mean_dim(4).mean_dim(3).mean_dim(2).reshape([n, c])
}
