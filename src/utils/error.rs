//! Error Handling Module
//!
//! Defines the error type shared by every stage of a training run.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for training operations
#[derive(Error, Debug)]
pub enum TrainerError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations (empty data, bad labels)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error (unknown architecture tag, invalid geometry)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while building or persisting a model
    #[error("Model error: {0}")]
    Model(String),

    /// Error raised inside the fit loop
    #[error("Training error: {0}")]
    Training(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for TrainerError {
    fn from(err: serde_json::Error) -> Self {
        TrainerError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for TrainerError {
    fn from(err: csv::Error) -> Self {
        TrainerError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for TrainerError {
    fn from(err: toml::ser::Error) -> Self {
        TrainerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TrainerError {
    fn from(err: toml::de::Error) -> Self {
        TrainerError::Config(err.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, TrainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainerError::Dataset("no images".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no images");
    }

    #[test]
    fn test_config_error_display() {
        let err = TrainerError::Config("unknown architecture 'x'".to_string());
        assert!(format!("{}", err).starts_with("Configuration error"));
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/cls_a/image.png");
        let err = TrainerError::ImageLoad(path, "truncated".to_string());
        assert!(format!("{}", err).contains("image.png"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TrainerError = io.into();
        assert!(matches!(err, TrainerError::Io(_)));
    }

    #[test]
    fn test_toml_conversion() {
        let parsed: std::result::Result<toml::Value, toml::de::Error> = toml::from_str("= broken");
        let err: TrainerError = parsed.unwrap_err().into();
        assert!(matches!(err, TrainerError::Config(_)));
    }
}
