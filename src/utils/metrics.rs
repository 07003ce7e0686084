//! Evaluation metrics
//!
//! Accuracy, per-class precision/recall/F1/support and the confusion matrix
//! computed from argmax predictions on the held-out split.

use serde::{Deserialize, Serialize};

/// Summary metrics for one evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of samples evaluated
    pub total_samples: usize,
    /// Number of correct predictions
    pub correct_predictions: usize,
    /// correct / total
    pub accuracy: f64,
    /// Mean precision over classes with support
    pub macro_precision: f64,
    /// Mean recall over classes with support
    pub macro_recall: f64,
    /// Mean F1 over classes with support
    pub macro_f1: f64,
    /// F1 weighted by class support
    pub weighted_f1: f64,
    /// Per-class metrics, indexed by class
    pub per_class: Vec<ClassMetrics>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Build metrics from predicted and true class indices
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        debug_assert_eq!(predictions.len(), ground_truth.len());

        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let total_samples = confusion_matrix.total();
        let correct_predictions = confusion_matrix.correct();

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let mean = |f: fn(&ClassMetrics) -> f64| {
            if supported.is_empty() {
                0.0
            } else {
                supported.iter().map(|m| f(*m)).sum::<f64>() / supported.len() as f64
            }
        };

        let macro_precision = mean(|m| m.precision);
        let macro_recall = mean(|m| m.recall);
        let macro_f1 = mean(|m| m.f1);

        let weighted_f1 = if total_samples > 0 {
            per_class.iter().map(|m| m.f1 * m.support as f64).sum::<f64>() / total_samples as f64
        } else {
            0.0
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy: confusion_matrix.accuracy(),
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            per_class,
            confusion_matrix,
        }
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for (metrics, name) in self.per_class.iter_mut().zip(names) {
            metrics.class_name = Some(name.clone());
        }
        self
    }

    pub fn precision(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.precision).collect()
    }

    pub fn recall(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.recall).collect()
    }

    pub fn f1(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.f1).collect()
    }

    pub fn support(&self) -> Vec<usize> {
        self.per_class.iter().map(|m| m.support).collect()
    }

    /// Pretty print metrics
    pub fn display(&self) -> String {
        let mut output = String::new();
        output.push_str("Class                     Precision   Recall      F1  Support\n");
        for m in &self.per_class {
            let name = m
                .class_name
                .clone()
                .unwrap_or_else(|| m.class_idx.to_string());
            output.push_str(&format!(
                "{:<24} {:>10.3} {:>8.3} {:>7.3} {:>8}\n",
                truncate(&name, 24),
                m.precision,
                m.recall,
                m.f1,
                m.support
            ));
        }
        output.push_str(&format!(
            "Accuracy: {:.2}%  Macro P/R/F1: {:.3}/{:.3}/{:.3}  Samples: {}\n",
            self.accuracy * 100.0,
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples
        ));
        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// TP / (TP + FP)
    pub precision: f64,
    /// TP / (TP + FN)
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);
        let predicted = cm.col_sum(class_idx);
        let support = cm.row_sum(class_idx);
        let false_positives = predicted - true_positives;
        let false_negatives = support - true_positives;

        let precision = ratio(true_positives, predicted);
        let recall = ratio(true_positives, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion matrix, row = actual, column = predicted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    /// Row-major counts
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Count one prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    pub fn row_sum(&self, row: usize) -> usize {
        (0..self.num_classes).map(|col| self.get(row, col)).sum()
    }

    pub fn col_sum(&self, col: usize) -> usize {
        (0..self.num_classes).map(|row| self.get(row, col)).sum()
    }

    /// Rows scaled to sum to one (empty rows stay zero)
    pub fn normalize_rows(&self) -> Vec<Vec<f64>> {
        (0..self.num_classes)
            .map(|row| {
                let sum = self.row_sum(row);
                (0..self.num_classes)
                    .map(|col| ratio(self.get(row, col), sum))
                    .collect()
            })
            .collect()
    }
}

/// Running loss/accuracy accumulator for one epoch
#[derive(Debug, Clone, Default)]
pub struct EpochAccumulator {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    seen: usize,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch: its mean loss, correct count and size
    pub fn add_batch(&mut self, loss: f64, correct: usize, size: usize) {
        self.loss_sum += loss;
        self.batches += 1;
        self.correct += correct;
        self.seen += size;
    }

    pub fn loss(&self) -> f64 {
        if self.batches > 0 {
            self.loss_sum / self.batches as f64
        } else {
            0.0
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert_eq!(class0.support, 3);
        assert!((class0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((class0.recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_support_sums_to_total() {
        let predictions = vec![1, 1, 0, 2, 2, 2];
        let ground_truth = vec![0, 1, 0, 2, 1, 2];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(metrics.support().iter().sum::<usize>(), 6);
        assert_eq!(metrics.support(), vec![2, 2, 2]);
    }

    #[test]
    fn test_macro_skips_unsupported_classes() {
        // Class 2 never occurs and is never predicted
        let predictions = vec![0, 1];
        let ground_truth = vec![0, 1];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3);

        assert!((metrics.macro_precision - 1.0).abs() < 1e-9);
        assert!((metrics.macro_f1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_predictions() {
        let metrics = Metrics::from_predictions(&[], &[], 2);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_normalize_rows() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 0, 1], 2);
        let rows = cm.normalize_rows();
        assert!((rows[0][0] - 0.5).abs() < 1e-9);
        assert!((rows[1][1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_epoch_accumulator() {
        let mut acc = EpochAccumulator::new();
        acc.add_batch(1.0, 3, 4);
        acc.add_batch(0.5, 1, 4);
        assert!((acc.loss() - 0.75).abs() < 1e-9);
        assert!((acc.accuracy() - 0.5).abs() < 1e-9);
    }
}
