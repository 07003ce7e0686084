//! Off-the-shelf classifier architectures
//!
//! Implements:
//! - ResNet-18 (basic residual blocks, four stages)
//! - EfficientNet-B0 (MBConv blocks with squeeze-and-excitation)
//!
//! Both are built with random weights for an arbitrary number of input
//! channels and classes. `embed` returns the globally pooled feature
//! vector that feeds the final linear layer; transfer learning uses it as
//! the backbone output.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use crate::model::Classifier;

/// Feature width of ResNet-18
pub const RESNET18_FEATURES: usize = 512;

/// Feature width of EfficientNet-B0
pub const EFFICIENTNET_B0_FEATURES: usize = 1280;

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    groups: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(kernel / 2, kernel / 2))
        .with_groups(groups)
        .with_bias(false)
        .init(device)
}

/// 1x1 (or strided) convolution followed by batch norm
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> ConvNorm<B> {
    fn new(channels: [usize; 2], kernel: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv(channels, kernel, stride, 1, device),
            bn: BatchNormConfig::new(channels[1]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

fn flatten_pooled<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, _, _] = x.dims();
    x.reshape([batch, channels])
}

// ResNet-18

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<ConvNorm<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| ConvNorm::new([in_channels, out_channels], 1, stride, device));

        Self {
            conv1: conv([in_channels, out_channels], 3, stride, 1, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv([out_channels, out_channels], 3, 1, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        self.relu.forward(out + identity)
    }
}

/// ResNet-18
///
/// - Conv 7x7 stride 2, max pool 3x3 stride 2
/// - 4 stages of 2 basic blocks: 64, 128, 256, 512 channels
/// - global average pooling, linear classifier
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    blocks: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    relu: Relu,
}

impl<B: Backend> ResNet18<B> {
    pub fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(8);
        let mut channels = 64;
        for (stage, width) in [64, 128, 256, 512].into_iter().enumerate() {
            let stride = if stage == 0 { 1 } else { 2 };
            blocks.push(BasicBlock::new(channels, width, stride, device));
            blocks.push(BasicBlock::new(width, width, 1, device));
            channels = width;
        }

        Self {
            conv1: conv([in_channels, 64], 7, 2, 1, device),
            bn1: BatchNormConfig::new(64).init(device),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(RESNET18_FEATURES, num_classes).init(device),
            relu: Relu::new(),
        }
    }

    /// Pooled features, `[batch, 512]`
    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let mut x = self.maxpool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        flatten_pooled(self.avgpool.forward(x))
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.embed(input))
    }
}

impl<B: Backend> Classifier<B, 4> for ResNet18<B> {
    fn logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embed(input)
    }
}

// EfficientNet-B0

/// Squeeze-and-excitation gate
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = activation::silu(self.reduce.forward(scale));
        let scale = activation::sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// Mobile inverted bottleneck
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    expand: Option<ConvNorm<B>>,
    depthwise: Conv2d<B>,
    depthwise_bn: BatchNorm<B>,
    se: SqueezeExcite<B>,
    project: ConvNorm<B>,
    residual: bool,
}

impl<B: Backend> MbConv<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand = (expand_ratio != 1).then(|| ConvNorm::new([in_channels, hidden], 1, 1, device));

        Self {
            expand,
            depthwise: conv([hidden, hidden], kernel, stride, hidden, device),
            depthwise_bn: BatchNormConfig::new(hidden).init(device),
            se: SqueezeExcite::new(hidden, (in_channels / 4).max(1), device),
            project: ConvNorm::new([hidden, out_channels], 1, 1, device),
            residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => activation::silu(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = activation::silu(self.depthwise_bn.forward(self.depthwise.forward(x)));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            x + input
        } else {
            x
        }
    }
}

/// Stage layout: (expand ratio, output channels, repeats, stride, kernel)
const B0_STAGES: [(usize, usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1, 3),
    (6, 24, 2, 2, 3),
    (6, 40, 2, 2, 5),
    (6, 80, 3, 2, 3),
    (6, 112, 3, 1, 5),
    (6, 192, 4, 2, 5),
    (6, 320, 1, 1, 3),
];

/// EfficientNet-B0
///
/// - Stem: conv 3x3 stride 2, 32 channels
/// - 16 MBConv blocks in 7 stages
/// - Head: conv 1x1 to 1280, global average pooling, dropout 0.2, linear
#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B>,
    blocks: Vec<MbConv<B>>,
    head_conv: Conv2d<B>,
    head_bn: BatchNorm<B>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> EfficientNetB0<B> {
    pub fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        let mut blocks = Vec::new();
        let mut channels = 32;
        for (expand, width, repeats, stride, kernel) in B0_STAGES {
            for i in 0..repeats {
                let stride = if i == 0 { stride } else { 1 };
                blocks.push(MbConv::new(channels, width, expand, kernel, stride, device));
                channels = width;
            }
        }

        Self {
            stem: conv([in_channels, 32], 3, 2, 1, device),
            stem_bn: BatchNormConfig::new(32).init(device),
            blocks,
            head_conv: conv([channels, EFFICIENTNET_B0_FEATURES], 1, 1, 1, device),
            head_bn: BatchNormConfig::new(EFFICIENTNET_B0_FEATURES).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(0.2).init(),
            fc: LinearConfig::new(EFFICIENTNET_B0_FEATURES, num_classes).init(device),
        }
    }

    /// Pooled features, `[batch, 1280]`
    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = activation::silu(self.stem_bn.forward(self.stem.forward(input)));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = activation::silu(self.head_bn.forward(self.head_conv.forward(x)));
        flatten_pooled(self.pool.forward(x))
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.dropout.forward(self.embed(input));
        self.fc.forward(x)
    }
}

impl<B: Backend> Classifier<B, 4> for EfficientNetB0<B> {
    fn logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embed(input)
    }
}
