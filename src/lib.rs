//! # CNN Trainer
//!
//! A Rust library for training convolutional image classifiers with the Burn framework.
//! Built for labelled image collections organised as one directory per class, such as
//! microscopy and plankton datasets.
//!
//! ## Features
//!
//! - **Cyclic CNNs**: rotation-equivariant networks whose depth follows the input size
//! - **Model zoo**: ResNet-18 and EfficientNet-B0 trained end to end
//! - **Transfer learning** with a frozen backbone and a dense tail trained on its features
//! - **Adaptive learning rate** that decays on validation plateaus and ends training
//! - **Reports**: SVG curves, confusion matrix, JSON results, Model Info XML and a
//!   mislabel candidate list
//!
//! ## Modules
//!
//! - `dataset`: Directory loading, stratified splits, augmentation and batch generation
//! - `model`: Network architectures and the architecture factory
//! - `training`: Fit loop, adaptive learning rate and the end-to-end orchestrator
//! - `inference`: Batched prediction, feature extraction and latency measurement
//! - `utils`: Errors, logging, metrics and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cnn_trainer::backend::{Session, TrainingBackend};
//! use cnn_trainer::config::{load_toml_config, TrainingConfig};
//! use cnn_trainer::training::train_image_classification_model;
//!
//! let config: TrainingConfig = load_toml_config("configs/forams.toml".as_ref())?;
//! let session = Session::<TrainingBackend>::with_default_device(config.seed);
//! let outcome = train_image_classification_model(&config, None, &session)?;
//! println!("accuracy {:.3}", outcome.result.accuracy);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use backend::Session;
pub use config::{load_toml_config, SaveMode, TrainingConfig};
pub use dataset::{
    AugmentationConfig, Augmenter, BatchGenerator, ColorMode, DataSource, GeneratorOptions,
    ImageShape,
};
pub use inference::latency::LatencyReport;
pub use inference::{extract_features, predict, Predictions};
pub use model::{build_network, build_transfer, ArchitectureTag, Classifier, ModelMode, Network};
pub use training::{
    train_image_classification_model, AdaptiveLrController, History, ModelInfo, TrainingOutcome,
    TrainingResult,
};
pub use utils::error::{Result, TrainerError};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
