//! Training configuration
//!
//! A run is described by one [`TrainingConfig`], usually read from a TOML
//! file. Every section and field has a default so a config file only needs
//! to name what it changes. The configuration is never mutated once a run
//! starts; derived values (class count, colour mode, class weights) live in
//! the run state instead.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::model::ArchitectureTag;
use crate::utils::error::{Result, TrainerError};

/// Complete configuration for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Run name, used as prefix of the output directory
    pub name: String,
    /// Free-text description; generated from the results when absent
    pub description: Option<String>,
    /// Base seed for splits, shuffles and augmentation
    pub seed: u64,
    pub model: ModelParams,
    pub training: TrainingParams,
    pub data: DataParams,
    pub augmentation: AugmentationConfig,
    pub output: OutputParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            name: "network".to_string(),
            description: None,
            seed: 42,
            model: ModelParams::default(),
            training: TrainingParams::default(),
            data: DataParams::default(),
            augmentation: AugmentationConfig::default(),
            output: OutputParams::default(),
        }
    }
}

/// Architecture and input geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Architecture tag, e.g. `base_cyclic`, `resnet18`, `resnet18_tl`
    pub architecture: String,
    pub img_height: usize,
    pub img_width: usize,
    /// 1 for greyscale, 3 for colour
    pub img_channels: usize,
    /// Filters of the first cyclic block, doubled each block
    pub filters: usize,
    pub activation: Activation,
    pub use_batch_norm: bool,
    pub global_pooling: GlobalPooling,
    /// Optional record file with backbone weights for transfer learning
    pub backbone_weights: Option<PathBuf>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            architecture: "base_cyclic".to_string(),
            img_height: 128,
            img_width: 128,
            img_channels: 1,
            filters: 4,
            activation: Activation::Relu,
            use_batch_norm: true,
            global_pooling: GlobalPooling::None,
            backbone_weights: None,
        }
    }
}

/// Optimisation hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub batch_size: usize,
    /// Upper bound on epochs; the learning-rate controller usually stops earlier
    pub max_epochs: usize,
    /// Initial Adam learning rate
    pub learning_rate: f64,
    /// Epochs without improvement before the learning rate is reduced
    pub alr_epochs: usize,
    /// Number of reductions before training stops
    pub alr_drops: usize,
    /// Multiplier applied at each reduction
    pub alr_decay: f64,
    pub use_class_weights: bool,
    pub use_augmentation: bool,
    /// Round steps per epoch up instead of down so the trailing partial
    /// batch is visited every epoch
    pub cover_partial_batch: bool,
    /// Number of batches prepared ahead of the fit loop
    pub prefetch: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_epochs: 10_000,
            learning_rate: 1e-3,
            alr_epochs: 10,
            alr_drops: 4,
            alr_decay: 0.5,
            use_class_weights: true,
            use_augmentation: true,
            cover_partial_batch: false,
            prefetch: 4,
        }
    }
}

/// Data source and split policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataParams {
    /// Directory with one sub-directory of images per class
    pub input_source: PathBuf,
    /// Classes with fewer images are dropped (or mapped to `others`)
    pub data_min_count: usize,
    /// Fraction of every class held out for testing, in `[0, 1)`
    pub data_split: f64,
    /// Selects which slice of each class is held out, in units of the split
    pub data_split_offset: usize,
    /// Merge small classes into an `others` class instead of dropping them
    pub data_map_others: bool,
    /// Rename or merge classes: directory name -> class label
    pub class_mapping: BTreeMap<String, String>,
}

impl Default for DataParams {
    fn default() -> Self {
        Self {
            input_source: PathBuf::from("data/images"),
            data_min_count: 40,
            data_split: 0.2,
            data_split_offset: 0,
            data_map_others: false,
            class_mapping: BTreeMap::new(),
        }
    }
}

/// Output destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    pub output_dir: PathBuf,
    pub save_model: SaveMode,
    /// Write the nearest-neighbour mislabel report
    pub save_mislabeled: bool,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            save_model: SaveMode::Frozen,
            save_mislabeled: false,
        }
    }
}

/// How the trained model is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Inference-mode record, half precision
    Frozen,
    /// Full-precision record of the trained weights
    Unfrozen,
    /// Only the Model Info and diagnostics are written
    None,
}

/// Convolution activation of the cyclic network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    LeakyRelu,
    Gelu,
    Silu,
}

/// Reduction applied after the last convolution block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalPooling {
    /// Flatten the final feature map
    None,
    Avg,
    Max,
}

impl TrainingConfig {
    /// Check option ranges. Architecture tags are checked here as well as
    /// by the model factory.
    pub fn validate(&self) -> Result<()> {
        let tag: ArchitectureTag = self.model.architecture.parse()?;

        if self.model.img_height < 8 || self.model.img_width < 8 {
            return Err(TrainerError::Config(format!(
                "image size {}x{} is too small (minimum 8x8)",
                self.model.img_height, self.model.img_width
            )));
        }
        if !matches!(self.model.img_channels, 1 | 3) {
            return Err(TrainerError::Config(format!(
                "img_channels must be 1 or 3, got {}",
                self.model.img_channels
            )));
        }
        if tag == ArchitectureTag::BaseCyclic && self.model.img_height != self.model.img_width {
            return Err(TrainerError::Config(
                "base_cyclic requires square images".to_string(),
            ));
        }
        if self.model.filters == 0 {
            return Err(TrainerError::Config("filters must be positive".to_string()));
        }
        if self.training.batch_size == 0 {
            return Err(TrainerError::Config("batch_size must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.data.data_split) {
            return Err(TrainerError::Config(format!(
                "data_split must be in [0, 1), got {}",
                self.data.data_split
            )));
        }
        if !(self.training.alr_decay > 0.0 && self.training.alr_decay < 1.0) {
            return Err(TrainerError::Config(format!(
                "alr_decay must be in (0, 1), got {}",
                self.training.alr_decay
            )));
        }
        if self.training.alr_epochs == 0 {
            return Err(TrainerError::Config("alr_epochs must be positive".to_string()));
        }
        self.augmentation.validate()
    }
}

/// Read a TOML file into any deserialisable config type
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        TrainerError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content)
        .map_err(|e| TrainerError::Config(format!("Failed to parse config {}: {e}", path.display())))
}

/// Write any serialisable config type as pretty TOML
pub fn save_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrainingConfig = toml::from_str(
            r#"
            name = "forams"

            [model]
            architecture = "resnet18_tl"
            img_channels = 3

            [output]
            save_model = "unfrozen"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "forams");
        assert_eq!(config.model.architecture, "resnet18_tl");
        assert_eq!(config.model.img_height, 128);
        assert_eq!(config.training.alr_drops, 4);
        assert_eq!(config.output.save_model, SaveMode::Unfrozen);
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        let mut config = TrainingConfig::default();
        config.model.architecture = "not_a_real_model".to_string();
        assert!(matches!(config.validate(), Err(TrainerError::Config(_))));
    }

    #[test]
    fn test_split_out_of_range_rejected() {
        let mut config = TrainingConfig::default();
        config.data.data_split = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cyclic_requires_square_input() {
        let mut config = TrainingConfig::default();
        config.model.img_width = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "seed = 7\n[training]\nbatch_size = 16\n").unwrap();

        let config: TrainingConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.training.batch_size, 16);
    }

    #[test]
    fn test_saved_config_reloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = TrainingConfig::default();
        config.description = Some("plankton run".to_string());
        config.training.batch_size = 24;
        config.training.alr_drops = 2;
        config.data.class_mapping.insert("diatom_a".to_string(), "diatom".to_string());
        config.output.save_model = SaveMode::None;

        save_toml_config(&config, &path).unwrap();
        let loaded: TrainingConfig = load_toml_config(&path).unwrap();

        assert_eq!(loaded.description.as_deref(), Some("plankton run"));
        assert_eq!(loaded.training.batch_size, 24);
        assert_eq!(loaded.training.alr_drops, 2);
        assert_eq!(loaded.data.class_mapping["diatom_a"], "diatom");
        assert_eq!(loaded.output.save_model, SaveMode::None);
        assert_eq!(loaded.augmentation, config.augmentation);
    }

    #[test]
    fn test_load_missing_config() {
        let result: Result<TrainingConfig> = load_toml_config(Path::new("/nonexistent/run.toml"));
        assert!(matches!(result, Err(TrainerError::Config(_))));
    }
}
