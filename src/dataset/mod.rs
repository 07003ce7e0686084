//! Dataset module: loading, splitting, augmentation and batch generation
//!
//! - `source`: directory loader with class mapping and minimum-count policy
//! - `split`: stratified, seeded train/test split with fold offsets
//! - `generator`: permutation-ordered batch generator with prefetch
//! - `augmentation`: random rotation, zoom, gain, gamma, bias and noise
//! - `batcher`: conversion of generator batches into Burn tensors

pub mod augmentation;
pub mod batcher;
pub mod generator;
pub mod source;
pub mod split;

use serde::{Deserialize, Serialize};

pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{Example, ExampleBatcher, TensorBatch};
pub use generator::{Batch, BatchGenerator, GeneratorOptions};
pub use source::{ColorMode, DataSource};
pub use split::DatasetSplit;

/// Channel-first geometry shared by every image of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Number of values in one image
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}
