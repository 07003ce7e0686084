//! Inference latency measurement
//!
//! Predicts a capped sample of images several times and reports the median
//! time per image. Runs on the inference-mode model after training.

use std::sync::Arc;
use std::time::Instant;

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::ExampleBatcher;
use crate::inference::predict;
use crate::model::Classifier;
use crate::utils::error::Result;
use crate::utils::median;

/// Largest number of images timed per trial
pub const MAX_LATENCY_SAMPLES: usize = 1000;

/// Number of timed trials
pub const LATENCY_TRIALS: usize = 3;

/// Timing of repeated prediction passes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyReport {
    /// Images predicted per trial
    pub samples: usize,
    /// Milliseconds per image, one entry per trial
    pub trial_ms_per_image: Vec<f64>,
    /// Median of the trials
    pub median_ms_per_image: f64,
}

/// Time `LATENCY_TRIALS` predictions of the first `MAX_LATENCY_SAMPLES`
/// images of `indices`
pub fn measure_inference_latency<B, M, const D: usize>(
    model: &M,
    data: &Arc<Vec<Vec<f32>>>,
    indices: &[usize],
    batcher: &ExampleBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<LatencyReport>
where
    B: Backend,
    M: Classifier<B, D>,
{
    let sample = &indices[..indices.len().min(MAX_LATENCY_SAMPLES)];
    if sample.is_empty() {
        return Ok(LatencyReport::default());
    }

    let mut trial_ms_per_image = Vec::with_capacity(LATENCY_TRIALS);
    for _ in 0..LATENCY_TRIALS {
        let start = Instant::now();
        predict::<B, M, D>(model, data, sample, batcher, batch_size, device)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        trial_ms_per_image.push(elapsed_ms / sample.len() as f64);
    }

    let median_ms_per_image = median(&trial_ms_per_image);
    info!(
        "Inference latency: {:.3} ms/image (median of {} trials, {} images)",
        median_ms_per_image,
        LATENCY_TRIALS,
        sample.len()
    );

    Ok(LatencyReport {
        samples: sample.len(),
        trial_ms_per_image,
        median_ms_per_image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tail;

    type TestBackend = burn_ndarray::NdArray;

    #[test]
    fn test_latency_report() {
        let device = Default::default();
        let tail = Tail::<TestBackend>::new(8, 2, &device);
        let data = Arc::new(vec![vec![0.1; 8]; 20]);
        let indices: Vec<usize> = (0..20).collect();
        let batcher = ExampleBatcher::vectors(8);

        let report =
            measure_inference_latency::<TestBackend, _, 2>(&tail, &data, &indices, &batcher, 8, &device)
                .unwrap();
        assert_eq!(report.samples, 20);
        assert_eq!(report.trial_ms_per_image.len(), LATENCY_TRIALS);
        assert!(report.median_ms_per_image >= 0.0);
    }

    #[test]
    fn test_empty_sample() {
        let device = Default::default();
        let tail = Tail::<TestBackend>::new(8, 2, &device);
        let data = Arc::new(Vec::new());
        let batcher = ExampleBatcher::vectors(8);

        let report =
            measure_inference_latency::<TestBackend, _, 2>(&tail, &data, &[], &batcher, 8, &device).unwrap();
        assert_eq!(report.samples, 0);
    }
}
