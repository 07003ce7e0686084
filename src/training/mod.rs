//! Training pipeline
//!
//! This module provides:
//! - The epoch/step fit loop with validation and adaptive learning rate
//! - The end-to-end orchestrator that loads data, trains, evaluates and saves
//! - The result record, Model Info record and mislabel report it writes
//!
//! ## Training Regimes
//!
//! Networks trained end to end see augmented images every step. Transfer
//! networks are trained in two phases:
//! 1. Run the frozen backbone once over every image to get feature vectors
//! 2. Train a dense tail on those vectors
//! 3. Join backbone and tail into a single image classifier

pub mod adaptive_lr;
pub mod fit;
pub mod mislabel;
pub mod model_info;
pub mod orchestrator;
pub mod result;

pub use adaptive_lr::{AdaptiveLrController, LrDecision};
pub use fit::{evaluate, fit, EvalSet, FitOutcome, FitSettings, History};
pub use mislabel::{find_mislabeled, write_mislabel_report, MislabelCandidate};
pub use model_info::{ModelInfo, TensorBinding};
pub use orchestrator::{steps_per_epoch, train_image_classification_model, TrainingOutcome};
pub use result::TrainingResult;
