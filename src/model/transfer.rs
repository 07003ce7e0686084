//! Transfer learning: frozen backbone ("head") plus dense classifier ("tail")
//!
//! The head turns an image into a fixed-length feature vector. The tail is
//! trained on vectors the head produced once up front, then the two are
//! joined into a [`TransferModel`] that maps images straight to logits.

use std::path::Path;

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::model::cyclic::{DENSE_DROPOUT, DENSE_WIDTH};
use crate::model::zoo::{EfficientNetB0, ResNet18, EFFICIENTNET_B0_FEATURES, RESNET18_FEATURES};
use crate::model::Classifier;
use crate::utils::error::{Result, TrainerError};

/// Feature extractor used as the head of a transfer model
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    ResNet18(ResNet18<B>),
    EfficientNetB0(EfficientNetB0<B>),
}

impl<B: Backend> Backbone<B> {
    /// Length of the feature vector `embed` produces
    pub fn feature_len(&self) -> usize {
        match self {
            Backbone::ResNet18(_) => RESNET18_FEATURES,
            Backbone::EfficientNetB0(_) => EFFICIENTNET_B0_FEATURES,
        }
    }

    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Backbone::ResNet18(model) => model.embed(input),
            Backbone::EfficientNetB0(model) => model.embed(input),
        }
    }

    /// Load pretrained parameters saved with the compact recorder
    ///
    /// The stored network must share the backbone's layout, including its
    /// classifier layer of [`BACKBONE_CLASSES`] outputs that `embed` skips.
    ///
    /// [`BACKBONE_CLASSES`]: crate::model::factory::BACKBONE_CLASSES
    pub fn load_weights(self, path: &Path, device: &B::Device) -> Result<Self> {
        if !path.exists() && !path.with_extension("mpk").exists() {
            return Err(TrainerError::PathNotFound(path.to_path_buf()));
        }
        info!("Loading backbone weights from {:?}", path);
        self.load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| TrainerError::Model(format!("Failed to load backbone weights: {}", e)))
    }

    /// Stop gradients from flowing into the backbone parameters
    pub fn freeze(self) -> Self {
        self.no_grad()
    }
}

/// Dense 512, ReLU, dropout 0.5, dense `num_classes`
#[derive(Module, Debug)]
pub struct Tail<B: Backend> {
    dense: Linear<B>,
    relu: Relu,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> Tail<B> {
    pub fn new(in_features: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            dense: LinearConfig::new(in_features, DENSE_WIDTH).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(DENSE_DROPOUT).init(),
            output: LinearConfig::new(DENSE_WIDTH, num_classes).init(device),
        }
    }

    pub fn embed(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.relu.forward(self.dense.forward(features))
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(self.embed(features));
        self.output.forward(x)
    }
}

impl<B: Backend> Classifier<B, 2> for Tail<B> {
    fn logits(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.embed(input)
    }
}

/// Backbone and trained tail joined into one image classifier
#[derive(Module, Debug)]
pub struct TransferModel<B: Backend> {
    head: Backbone<B>,
    tail: Tail<B>,
}

impl<B: Backend> TransferModel<B> {
    pub fn new(head: Backbone<B>, tail: Tail<B>) -> Self {
        Self { head, tail }
    }

    pub fn head(&self) -> &Backbone<B> {
        &self.head
    }

    pub fn tail(&self) -> &Tail<B> {
        &self.tail
    }

    /// Tail activations, `[batch, 512]`
    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.tail.embed(self.head.embed(input))
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.tail.forward(self.head.embed(input))
    }
}

impl<B: Backend> Classifier<B, 4> for TransferModel<B> {
    fn logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embed(input)
    }
}
