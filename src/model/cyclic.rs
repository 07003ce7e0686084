//! Rotation-equivariant base network
//!
//! Every input image is presented to the convolution stack in four
//! orientations (0, 90, 180 and 270 degrees) stacked along the batch axis.
//! After the convolution blocks the four feature vectors of each image are
//! averaged, so the dense layers see a rotation-pooled representation.
//!
//! Architecture:
//! - `blocks = floor(log2(img_height) - 2)` convolution blocks
//! - each block: two 3x3 convolutions (optional batch norm), 2x2 max pool
//! - filters double with every block
//! - global pooling (none, average or max), cyclic average pool
//! - dense 512, dropout 0.5, dense `num_classes`

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
        PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::config::{Activation, GlobalPooling};
use crate::model::{activate, Classifier};

/// Width of the dense layer before the classifier
pub const DENSE_WIDTH: usize = 512;

/// Dropout applied after the dense layer
pub const DENSE_DROPOUT: f64 = 0.5;

/// Number of convolution blocks for a square input of side `img_height`
pub fn cyclic_block_count(img_height: usize) -> usize {
    ((img_height.max(1) as f64).log2() - 2.0).floor().max(1.0) as usize
}

/// Stack the four 90-degree rotations of `x` along the batch axis
///
/// Output batch order is `[r0 of all images, r90 ..., r180 ..., r270 ...]`.
pub fn cyclic_slice<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let r90 = rotate90(x.clone());
    let r180 = rotate90(r90.clone());
    let r270 = rotate90(r180.clone());
    Tensor::cat(vec![x, r90, r180, r270], 0)
}

/// Average the four orientation features of each image
pub fn cyclic_pool<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [rows, features] = x.dims();
    let batch = rows / 4;
    x.reshape([4, batch, features]).mean_dim(0).reshape([batch, features])
}

fn rotate90<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.swap_dims(2, 3).flip([3])
}

/// Two convolutions followed by max pooling
#[derive(Module, Debug)]
pub struct CyclicBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: Option<BatchNorm<B>>,
    conv2: Conv2d<B>,
    norm2: Option<BatchNorm<B>>,
    pool: MaxPool2d,
    activation: Ignored<Activation>,
}

impl<B: Backend> CyclicBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        activation: Activation,
        use_batch_norm: bool,
        device: &B::Device,
    ) -> Self {
        let conv = |c_in: usize| {
            Conv2dConfig::new([c_in, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(Initializer::KaimingNormal {
                    gain: std::f64::consts::SQRT_2,
                    fan_out_only: false,
                })
                .init(device)
        };
        let norm = || use_batch_norm.then(|| BatchNormConfig::new(out_channels).init(device));

        Self {
            conv1: conv(in_channels),
            norm1: norm(),
            conv2: conv(out_channels),
            norm2: norm(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Ignored(activation),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = match &self.norm1 {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = activate(x, self.activation.0);

        let x = self.conv2.forward(x);
        let x = match &self.norm2 {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = activate(x, self.activation.0);

        self.pool.forward(x)
    }
}

/// Settings for [`BaseCyclic`]
#[derive(Debug, Clone)]
pub struct BaseCyclicConfig {
    pub img_size: usize,
    pub in_channels: usize,
    pub num_classes: usize,
    pub filters: usize,
    pub activation: Activation,
    pub use_batch_norm: bool,
    pub global_pooling: GlobalPooling,
}

impl BaseCyclicConfig {
    pub fn blocks(&self) -> usize {
        cyclic_block_count(self.img_size)
    }

    /// Channels produced by the last block
    pub fn final_channels(&self) -> usize {
        self.filters << (self.blocks() - 1)
    }

    /// Length of the flattened feature vector entering the dense layer
    pub fn feature_len(&self) -> usize {
        match self.global_pooling {
            GlobalPooling::None => {
                let side = (self.img_size >> self.blocks()).max(1);
                self.final_channels() * side * side
            }
            GlobalPooling::Avg | GlobalPooling::Max => self.final_channels(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BaseCyclic<B> {
        let mut blocks = Vec::with_capacity(self.blocks());
        let mut in_channels = self.in_channels;
        for i in 0..self.blocks() {
            let out_channels = self.filters << i;
            blocks.push(CyclicBlock::new(
                in_channels,
                out_channels,
                self.activation,
                self.use_batch_norm,
                device,
            ));
            in_channels = out_channels;
        }

        BaseCyclic {
            blocks,
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dense: LinearConfig::new(self.feature_len(), DENSE_WIDTH).init(device),
            dropout: DropoutConfig::new(DENSE_DROPOUT).init(),
            output: LinearConfig::new(DENSE_WIDTH, self.num_classes).init(device),
            activation: Ignored(self.activation),
            global_pooling: Ignored(self.global_pooling),
            num_classes: self.num_classes,
        }
    }
}

/// Rotation-pooled convolutional classifier
#[derive(Module, Debug)]
pub struct BaseCyclic<B: Backend> {
    blocks: Vec<CyclicBlock<B>>,
    avg_pool: AdaptiveAvgPool2d,
    dense: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Ignored<Activation>,
    global_pooling: Ignored<GlobalPooling>,
    num_classes: usize,
}

impl<B: Backend> BaseCyclic<B> {
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Output of the dense layer after activation, `[batch, 512]`
    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = cyclic_slice(input);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let [n, c, h, w] = x.dims();
        let flat: Tensor<B, 2> = match self.global_pooling.0 {
            GlobalPooling::None => x.reshape([n, c * h * w]),
            GlobalPooling::Avg => self.avg_pool.forward(x).reshape([n, c]),
            GlobalPooling::Max => x.max_dim(3).max_dim(2).reshape([n, c]),
        };

        let pooled = cyclic_pool(flat);
        activate(self.dense.forward(pooled), self.activation.0)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.embed(input);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

impl<B: Backend> Classifier<B, 4> for BaseCyclic<B> {
    fn logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embed(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn_ndarray::NdArray;

    fn small_config(pooling: GlobalPooling) -> BaseCyclicConfig {
        BaseCyclicConfig {
            img_size: 16,
            in_channels: 1,
            num_classes: 3,
            filters: 2,
            activation: Activation::Relu,
            use_batch_norm: true,
            global_pooling: pooling,
        }
    }

    #[test]
    fn test_block_count() {
        assert_eq!(cyclic_block_count(128), 5);
        assert_eq!(cyclic_block_count(64), 4);
        assert_eq!(cyclic_block_count(32), 3);
        assert_eq!(cyclic_block_count(8), 1);
    }

    #[test]
    fn test_feature_len() {
        let config = small_config(GlobalPooling::None);
        // 16 -> 2 blocks -> 4x4 spatial, 4 channels
        assert_eq!(config.blocks(), 2);
        assert_eq!(config.final_channels(), 4);
        assert_eq!(config.feature_len(), 64);
        assert_eq!(small_config(GlobalPooling::Avg).feature_len(), 4);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        for pooling in [GlobalPooling::None, GlobalPooling::Avg, GlobalPooling::Max] {
            let model: BaseCyclic<TestBackend> = small_config(pooling).init(&device);
            let input = Tensor::<TestBackend, 4>::ones([2, 1, 16, 16], &device);

            assert_eq!(model.forward(input.clone()).dims(), [2, 3]);
            assert_eq!(model.embed(input).dims(), [2, DENSE_WIDTH]);
        }
    }

    #[test]
    fn test_cyclic_slice_rotates() {
        let device = Default::default();
        // 2x2 image [[1, 2], [3, 4]]
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );
        let sliced = cyclic_slice(x);
        assert_eq!(sliced.dims(), [4, 1, 2, 2]);

        let values = sliced.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[0..4], &[1.0, 2.0, 3.0, 4.0]);
        // Four quarter turns return to the start, so every orientation is distinct here
        assert_ne!(&values[4..8], &values[0..4]);
        assert_eq!(&values[8..12], &[4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_cyclic_pool_averages_orientations() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0], [3.0], [5.0], [7.0]], &device);
        let pooled = cyclic_pool(x);
        assert_eq!(pooled.dims(), [1, 1]);
        assert_eq!(pooled.into_data().to_vec::<f32>().unwrap(), vec![4.0]);
    }
}
