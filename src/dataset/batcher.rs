//! Burn batching for generator output
//!
//! Generator batches carry plain `Vec<f32>` values. [`ExampleBatcher`]
//! stacks them into a tensor of rank `D` (images: `[B, C, H, W]`, feature
//! vectors: `[B, F]`) plus an integer target tensor.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::dataset::generator::Batch;
use crate::dataset::ImageShape;

/// One labelled input
#[derive(Clone, Debug)]
pub struct Example {
    pub values: Vec<f32>,
    pub label: usize,
}

impl Example {
    /// Split a labelled generator batch into examples. Batches without
    /// labels get label 0.
    pub fn from_batch(batch: Batch<Vec<f32>, usize>) -> Vec<Example> {
        let n = batch.data.len();
        let labels = batch.labels.unwrap_or_else(|| vec![0; n]);
        batch
            .data
            .into_iter()
            .zip(labels)
            .map(|(values, label)| Example { values, label })
            .collect()
    }
}

/// Stacked inputs and targets
#[derive(Clone, Debug)]
pub struct TensorBatch<B: Backend, const D: usize> {
    pub inputs: Tensor<B, D>,
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks examples of a fixed per-item shape
#[derive(Clone, Debug)]
pub struct ExampleBatcher {
    item_shape: Vec<usize>,
}

impl ExampleBatcher {
    /// Batches of images, `[B, C, H, W]`
    pub fn images(shape: ImageShape) -> Self {
        Self {
            item_shape: shape.dims().to_vec(),
        }
    }

    /// Batches of feature vectors, `[B, dim]`
    pub fn vectors(dim: usize) -> Self {
        Self {
            item_shape: vec![dim],
        }
    }

    /// Stack raw values into one input tensor
    pub fn stack<B: Backend, const D: usize>(&self, items: &[Vec<f32>], device: &B::Device) -> Tensor<B, D> {
        let mut shape = Vec::with_capacity(self.item_shape.len() + 1);
        shape.push(items.len());
        shape.extend_from_slice(&self.item_shape);

        let values: Vec<f32> = items.iter().flat_map(|v| v.iter().copied()).collect();
        Tensor::<B, D>::from_floats(TensorData::new(values, shape), device)
    }
}

impl<B: Backend, const D: usize> Batcher<B, Example, TensorBatch<B, D>> for ExampleBatcher {
    fn batch(&self, items: Vec<Example>, device: &B::Device) -> TensorBatch<B, D> {
        let batch_size = items.len();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let values: Vec<Vec<f32>> = items.into_iter().map(|item| item.values).collect();

        let inputs = self.stack::<B, D>(&values, device);
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        TensorBatch { inputs, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn_ndarray::NdArray;

    #[test]
    fn test_image_batch_shape() {
        let device = Default::default();
        let batcher = ExampleBatcher::images(ImageShape::new(1, 4, 4));
        let items = vec![
            Example { values: vec![0.5; 16], label: 1 },
            Example { values: vec![0.25; 16], label: 0 },
        ];

        let batch: TensorBatch<TestBackend, 4> = batcher.batch(items, &device);

        assert_eq!(batch.inputs.dims(), [2, 1, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);
    }

    #[test]
    fn test_vector_batch_shape() {
        let device = Default::default();
        let batcher = ExampleBatcher::vectors(3);
        let items = vec![Example { values: vec![1.0, 2.0, 3.0], label: 2 }];

        let batch: TensorBatch<TestBackend, 2> = batcher.batch(items, &device);
        assert_eq!(batch.inputs.dims(), [1, 3]);
    }

    #[test]
    fn test_examples_from_unlabelled_batch() {
        let batch = Batch {
            indices: vec![0, 1],
            data: vec![vec![0.0], vec![1.0]],
            labels: None,
        };
        let examples = Example::from_batch(batch);
        assert_eq!(examples.len(), 2);
        assert!(examples.iter().all(|e| e.label == 0));
    }
}
