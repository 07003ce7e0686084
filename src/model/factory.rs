//! Architecture selection and model construction
//!
//! [`ArchitectureTag`] is the closed set of supported networks. Every
//! network is returned as a [`Compiled`] bundle: the freshly initialised
//! module plus the optimiser and loss configuration it is trained with.

use std::fmt;
use std::str::FromStr;

use burn::{
    module::Module,
    nn::loss::CrossEntropyLossConfig,
    optim::AdamConfig,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::config::TrainingConfig;
use crate::model::cyclic::{BaseCyclic, BaseCyclicConfig};
use crate::model::transfer::{Backbone, Tail, TransferModel};
use crate::model::zoo::{EfficientNetB0, ResNet18};
use crate::model::Classifier;
use crate::utils::error::{Result, TrainerError};

/// Classifier width of backbones built for transfer learning
pub const BACKBONE_CLASSES: usize = 1000;

/// Supported architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchitectureTag {
    BaseCyclic,
    ResNet18,
    EfficientNetB0,
    ResNet18Tl,
    EfficientNetB0Tl,
}

impl ArchitectureTag {
    pub const ALL: [ArchitectureTag; 5] = [
        ArchitectureTag::BaseCyclic,
        ArchitectureTag::ResNet18,
        ArchitectureTag::EfficientNetB0,
        ArchitectureTag::ResNet18Tl,
        ArchitectureTag::EfficientNetB0Tl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArchitectureTag::BaseCyclic => "base_cyclic",
            ArchitectureTag::ResNet18 => "resnet18",
            ArchitectureTag::EfficientNetB0 => "efficientnet_b0",
            ArchitectureTag::ResNet18Tl => "resnet18_tl",
            ArchitectureTag::EfficientNetB0Tl => "efficientnet_b0_tl",
        }
    }

    /// Trained with a frozen backbone and a separately fitted tail
    pub fn is_transfer(self) -> bool {
        matches!(self, ArchitectureTag::ResNet18Tl | ArchitectureTag::EfficientNetB0Tl)
    }
}

impl fmt::Display for ArchitectureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchitectureTag {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        ArchitectureTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = ArchitectureTag::ALL.iter().map(|t| t.as_str()).collect();
                TrainerError::Config(format!(
                    "unknown architecture '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// A network ready for training
#[derive(Debug)]
pub struct Compiled<M> {
    pub model: M,
    pub optimizer: AdamConfig,
    pub loss: CrossEntropyLossConfig,
}

impl<M> Compiled<M> {
    fn new(model: M) -> Self {
        Self {
            model,
            optimizer: AdamConfig::new(),
            loss: CrossEntropyLossConfig::new(),
        }
    }
}

/// Any image classifier this crate trains
#[derive(Module, Debug)]
pub enum Network<B: Backend> {
    BaseCyclic(BaseCyclic<B>),
    ResNet18(ResNet18<B>),
    EfficientNetB0(EfficientNetB0<B>),
    Transfer(TransferModel<B>),
}

impl<B: Backend> Network<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Network::BaseCyclic(model) => model.forward(input),
            Network::ResNet18(model) => model.forward(input),
            Network::EfficientNetB0(model) => model.forward(input),
            Network::Transfer(model) => model.forward(input),
        }
    }

    /// Penultimate-layer vector used for similarity search and export
    pub fn embed(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Network::BaseCyclic(model) => model.embed(input),
            Network::ResNet18(model) => model.embed(input),
            Network::EfficientNetB0(model) => model.embed(input),
            Network::Transfer(model) => model.embed(input),
        }
    }
}

impl<B: Backend> Classifier<B, 4> for Network<B> {
    fn logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embed(input)
    }
}

/// Build a network trained end to end on images
///
/// Transfer tags are rejected; use [`build_transfer`] for those.
pub fn build_network<B: Backend>(
    config: &TrainingConfig,
    num_classes: usize,
    device: &B::Device,
) -> Result<Compiled<Network<B>>> {
    let tag: ArchitectureTag = config.model.architecture.parse()?;
    let params = &config.model;

    let model = match tag {
        ArchitectureTag::BaseCyclic => {
            let cyclic = BaseCyclicConfig {
                img_size: params.img_height,
                in_channels: params.img_channels,
                num_classes,
                filters: params.filters,
                activation: params.activation,
                use_batch_norm: params.use_batch_norm,
                global_pooling: params.global_pooling,
            };
            info!(
                "Building base_cyclic: {} blocks, {} filters, {:?} pooling",
                cyclic.blocks(),
                cyclic.filters,
                cyclic.global_pooling
            );
            Network::BaseCyclic(cyclic.init(device))
        }
        ArchitectureTag::ResNet18 => {
            info!("Building resnet18 with {} classes", num_classes);
            Network::ResNet18(ResNet18::new(params.img_channels, num_classes, device))
        }
        ArchitectureTag::EfficientNetB0 => {
            info!("Building efficientnet_b0 with {} classes", num_classes);
            Network::EfficientNetB0(EfficientNetB0::new(params.img_channels, num_classes, device))
        }
        ArchitectureTag::ResNet18Tl | ArchitectureTag::EfficientNetB0Tl => {
            return Err(TrainerError::Config(format!(
                "'{}' is a transfer-learning architecture; build it with build_transfer",
                tag
            )));
        }
    };

    Ok(Compiled::new(model))
}

/// Build the frozen backbone and an untrained tail for a transfer tag
pub fn build_transfer<B: Backend>(
    config: &TrainingConfig,
    num_classes: usize,
    device: &B::Device,
) -> Result<(Backbone<B>, Compiled<Tail<B>>)> {
    let tag: ArchitectureTag = config.model.architecture.parse()?;
    let channels = config.model.img_channels.max(3);

    let head = match tag {
        ArchitectureTag::ResNet18Tl => Backbone::ResNet18(ResNet18::new(channels, BACKBONE_CLASSES, device)),
        ArchitectureTag::EfficientNetB0Tl => {
            Backbone::EfficientNetB0(EfficientNetB0::new(channels, BACKBONE_CLASSES, device))
        }
        _ => {
            return Err(TrainerError::Config(format!(
                "'{}' is not a transfer-learning architecture",
                tag
            )));
        }
    };

    let head = match &config.model.backbone_weights {
        Some(path) => head.load_weights(path, device)?,
        None => {
            info!("No backbone weights configured, using a randomly initialised {}", tag);
            head
        }
    };

    let tail = Tail::new(head.feature_len(), num_classes, device);
    Ok((head.freeze(), Compiled::new(tail)))
}

/// Join a backbone and trained tail into an image classifier
pub fn compose<B: Backend>(head: Backbone<B>, tail: Tail<B>) -> Network<B> {
    Network::Transfer(TransferModel::new(head, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn_ndarray::NdArray;

    fn config_for(architecture: &str, size: usize, channels: usize) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.model.architecture = architecture.to_string();
        config.model.img_height = size;
        config.model.img_width = size;
        config.model.img_channels = channels;
        config
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in ArchitectureTag::ALL {
            assert_eq!(tag.to_string().parse::<ArchitectureTag>().unwrap(), tag);
        }
        assert_eq!("ResNet18_TL".parse::<ArchitectureTag>().unwrap(), ArchitectureTag::ResNet18Tl);
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let result = "not_a_real_model".parse::<ArchitectureTag>();
        assert!(matches!(result, Err(TrainerError::Config(_))));

        let config = config_for("not_a_real_model", 32, 1);
        let device = Default::default();
        let result = build_network::<TestBackend>(&config, 2, &device);
        assert!(matches!(result, Err(TrainerError::Config(_))));
    }

    #[test]
    fn test_transfer_tags() {
        assert!(ArchitectureTag::ResNet18Tl.is_transfer());
        assert!(ArchitectureTag::EfficientNetB0Tl.is_transfer());
        assert!(!ArchitectureTag::BaseCyclic.is_transfer());
        assert!(!ArchitectureTag::ResNet18.is_transfer());
    }

    #[test]
    fn test_base_cyclic_block_count_for_128() {
        let device = Default::default();
        let compiled = build_network::<TestBackend>(&config_for("base_cyclic", 128, 1), 2, &device).unwrap();
        match compiled.model {
            Network::BaseCyclic(model) => assert_eq!(model.num_blocks(), 5),
            other => panic!("unexpected network {:?}", other),
        }
    }

    #[test]
    fn test_build_network_forward() {
        let device = Default::default();
        let compiled = build_network::<TestBackend>(&config_for("resnet18", 32, 1), 4, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 32, 32], &device);
        assert_eq!(compiled.model.forward(input).dims(), [2, 4]);
    }

    #[test]
    fn test_transfer_tag_rejected_by_build_network() {
        let device = Default::default();
        let result = build_network::<TestBackend>(&config_for("resnet18_tl", 32, 3), 2, &device);
        assert!(matches!(result, Err(TrainerError::Config(_))));
    }

    #[test]
    fn test_build_transfer_and_compose() {
        let device = Default::default();
        let (head, compiled) = build_transfer::<TestBackend>(&config_for("resnet18_tl", 32, 3), 3, &device).unwrap();
        let model = compose(head, compiled.model);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input.clone()).dims(), [1, 3]);
        assert_eq!(model.embed(input).dims(), [1, 512]);
    }
}
