//! Training result record
//!
//! Built once after evaluation and written to `training_result.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::training::fit::History;
use crate::utils::error::Result;
use crate::utils::metrics::Metrics;

/// Everything measured during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    pub name: String,
    pub architecture: String,
    pub class_names: Vec<String>,
    pub history: History,
    /// Dataset indices of the test partition
    pub test_indices: Vec<usize>,
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
    pub y_prob: Vec<Vec<f32>>,
    pub accuracy: f64,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_f1: f64,
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
    pub support: Vec<usize>,
    /// Wall-clock seconds spent in the fit loop (and feature extraction)
    pub training_time: f64,
    /// Median milliseconds per image
    pub inference_time_per_image: f64,
}

impl TrainingResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        architecture: &str,
        class_names: Vec<String>,
        history: History,
        test_indices: Vec<usize>,
        y_true: Vec<usize>,
        y_prob: Vec<Vec<f32>>,
        y_pred: Vec<usize>,
        training_time: f64,
        inference_time_per_image: f64,
    ) -> Self {
        let metrics = Metrics::from_predictions(&y_pred, &y_true, class_names.len());

        Self {
            name: name.to_string(),
            architecture: architecture.to_string(),
            class_names,
            history,
            test_indices,
            y_true,
            y_pred,
            y_prob,
            accuracy: metrics.accuracy,
            mean_precision: metrics.macro_precision,
            mean_recall: metrics.macro_recall,
            mean_f1: metrics.macro_f1,
            precision: metrics.precision(),
            recall: metrics.recall(),
            f1: metrics.f1(),
            support: metrics.support(),
            training_time,
            inference_time_per_image,
        }
    }

    /// Number of epochs the fit loop ran
    pub fn epochs_run(&self) -> usize {
        self.history.epochs()
    }

    /// Metrics recomputed from the stored predictions
    pub fn metrics(&self) -> Metrics {
        Metrics::from_predictions(&self.y_pred, &self.y_true, self.class_names.len())
            .with_class_names(&self.class_names)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Description used when the configuration does not provide one
pub fn default_description(
    name: &str,
    architecture: &str,
    source: &str,
    num_images: usize,
    num_classes: usize,
    result: &TrainingResult,
) -> String {
    format!(
        "{}: {} model trained on data from {} ({} images in {} classes).\n\
         Accuracy: {:.1} (P: {:.1}, R: {:.1}, F1 {:.1})",
        name,
        architecture,
        source,
        num_images,
        num_classes,
        result.accuracy * 100.0,
        result.mean_precision * 100.0,
        result.mean_recall * 100.0,
        result.mean_f1 * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> TrainingResult {
        TrainingResult::new(
            "forams",
            "base_cyclic",
            vec!["a".to_string(), "b".to_string()],
            History::default(),
            vec![3, 7, 8, 9],
            vec![0, 0, 1, 1],
            vec![vec![0.9, 0.1], vec![0.4, 0.6], vec![0.2, 0.8], vec![0.3, 0.7]],
            vec![0, 1, 1, 1],
            12.5,
            0.8,
        )
    }

    #[test]
    fn test_result_metrics() {
        let result = sample_result();
        assert!((result.accuracy - 0.75).abs() < 1e-9);
        assert_eq!(result.support, vec![2, 2]);
        assert_eq!(result.support.iter().sum::<usize>(), result.y_true.len());
        assert!((result.precision[1] - 2.0 / 3.0).abs() < 1e-9);
        assert!((result.recall[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_default_description() {
        let result = sample_result();
        let text = default_description("forams", "base_cyclic", "data/forams", 100, 2, &result);
        assert_eq!(
            text,
            "forams: base_cyclic model trained on data from data/forams (100 images in 2 classes).\n\
             Accuracy: 75.0 (P: 83.3, R: 75.0, F1 73.3)"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_result.json");
        let result = sample_result();

        result.save(&path).unwrap();
        let loaded: TrainingResult = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.y_pred, result.y_pred);
        assert_eq!(loaded.class_names, result.class_names);
    }
}
