//! Inference module for batched prediction and latency measurement
//!
//! This module provides:
//! - Batched class probabilities and penultimate-layer features
//! - Median per-image latency over repeated prediction trials
//!
//! Every pass walks the requested indices with a one-shot, unshuffled
//! [`BatchGenerator`], so outputs line up with the indices given.

pub mod latency;

use std::sync::Arc;

use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::{BatchGenerator, ExampleBatcher, GeneratorOptions};
use crate::model::Classifier;
use crate::utils::error::{Result, TrainerError};

pub use latency::{measure_inference_latency, LatencyReport};

/// Probabilities and arg-max classes, in input order
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub probabilities: Vec<Vec<f32>>,
    pub classes: Vec<usize>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Index of the largest value; 0 for an empty row
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Copy a `[rows, width]` tensor into one vector per row
pub fn tensor_rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, width] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainerError::Model(format!("Failed to read tensor data: {:?}", e)))?;

    Ok(values.chunks(width.max(1)).map(<[f32]>::to_vec).collect())
}

/// Run `f` over `data[indices]` in batches and collect the output rows
pub fn map_batches<B, F, const D: usize>(
    data: &Arc<Vec<Vec<f32>>>,
    indices: &[usize],
    batcher: &ExampleBatcher,
    batch_size: usize,
    device: &B::Device,
    mut f: F,
) -> Result<Vec<Vec<f32>>>
where
    B: Backend,
    F: FnMut(Tensor<B, D>) -> Tensor<B, 2>,
{
    let mut generator = BatchGenerator::<Vec<f32>, usize>::with_indices(
        Arc::clone(data),
        None,
        indices.to_vec(),
        GeneratorOptions::evaluation(batch_size.max(1)),
        ChaCha8Rng::seed_from_u64(0),
    );

    let mut rows = Vec::with_capacity(indices.len());
    for batch in generator.batches() {
        let inputs = batcher.stack::<B, D>(&batch.data, device);
        rows.extend(tensor_rows(f(inputs))?);
    }
    Ok(rows)
}

/// Class probabilities for `data[indices]`
pub fn predict<B, M, const D: usize>(
    model: &M,
    data: &Arc<Vec<Vec<f32>>>,
    indices: &[usize],
    batcher: &ExampleBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<Predictions>
where
    B: Backend,
    M: Classifier<B, D>,
{
    let probabilities = map_batches::<B, _, D>(data, indices, batcher, batch_size, device, |x| {
        model.probabilities(x)
    })?;
    let classes = probabilities.iter().map(|p| argmax(p)).collect();

    Ok(Predictions {
        probabilities,
        classes,
    })
}

/// Penultimate-layer vectors for `data[indices]`
pub fn extract_features<B, M, const D: usize>(
    model: &M,
    data: &Arc<Vec<Vec<f32>>>,
    indices: &[usize],
    batcher: &ExampleBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>>
where
    B: Backend,
    M: Classifier<B, D>,
{
    map_batches::<B, _, D>(data, indices, batcher, batch_size, device, |x| model.features(x))
}
