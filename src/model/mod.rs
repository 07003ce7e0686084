//! Network architectures
//!
//! - `cyclic`: the rotation-equivariant base network with a configurable
//!   number of convolution blocks
//! - `zoo`: ResNet-18 and EfficientNet-B0 style networks
//! - `transfer`: frozen backbone plus trainable dense tail
//! - `factory`: architecture tags and network construction

pub mod cyclic;
pub mod factory;
pub mod transfer;
pub mod zoo;

use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

pub use cyclic::{cyclic_block_count, BaseCyclic};
pub use factory::{build_network, build_transfer, compose, ArchitectureTag, Compiled, Network};
pub use transfer::{Backbone, Tail, TransferModel};
pub use zoo::{EfficientNetB0, ResNet18};

use crate::config::Activation;

/// A module mapping rank-`D` inputs to class logits
pub trait Classifier<B: Backend, const D: usize> {
    /// Class logits, `[batch, classes]`
    fn logits(&self, input: Tensor<B, D>) -> Tensor<B, 2>;

    /// Penultimate-layer features, `[batch, features]`
    fn features(&self, input: Tensor<B, D>) -> Tensor<B, 2>;

    /// Softmax class probabilities
    fn probabilities(&self, input: Tensor<B, D>) -> Tensor<B, 2> {
        activation::softmax(self.logits(input), 1)
    }
}

/// Behaviour of a network's dropout and batch-norm layers
///
/// Training-mode networks live on an autodiff backend; calling
/// `AutodiffModule::valid` moves them to the inner backend, where dropout is
/// disabled and batch norm uses its running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    Training,
    Inference,
}

impl std::fmt::Display for ModelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelMode::Training => write!(f, "training"),
            ModelMode::Inference => write!(f, "inference"),
        }
    }
}

/// Apply a configured activation function
pub(crate) fn activate<B: Backend, const D: usize>(x: Tensor<B, D>, kind: Activation) -> Tensor<B, D> {
    match kind {
        Activation::Relu => activation::relu(x),
        Activation::LeakyRelu => activation::leaky_relu(x, 0.01),
        Activation::Gelu => activation::gelu(x),
        Activation::Silu => activation::silu(x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn_ndarray::NdArray;

    #[test]
    fn test_activations_keep_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[-1.0, 0.0, 2.0]], &device);

        for kind in [Activation::Relu, Activation::LeakyRelu, Activation::Gelu, Activation::Silu] {
            assert_eq!(activate(x.clone(), kind).dims(), [1, 3]);
        }
    }

    #[test]
    fn test_relu_clips_negative() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-1.0, 2.0], &device);
        let values = activate(x, Activation::Relu).into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 2.0]);
    }
}
