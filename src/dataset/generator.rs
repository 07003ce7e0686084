//! Batch generator
//!
//! Walks an indexable data array (and optional parallel labels) through an
//! index permutation, one item at a time. The permutation is reshuffled at
//! the end of every full pass when shuffling is enabled. In repeating mode
//! the stream never ends; in one-shot mode it ends after a single pass.
//!
//! [`BatchGenerator::batches`] groups consecutive items into batches and
//! applies the optional per-batch map; [`BatchGenerator::into_prefetched`]
//! moves that work onto a producer thread behind a bounded queue.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::utils::error::Result;

/// Per-batch transform applied to the data half of a batch
pub type BatchMapFn<X> = Box<dyn FnMut(&mut [X]) + Send>;

/// Generator behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub batch_size: usize,
    /// Reshuffle the index permutation at construction and after every pass
    pub shuffle: bool,
    /// Stop after one pass instead of repeating forever
    pub one_shot: bool,
    /// Depth of the prefetch queue
    pub prefetch: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            one_shot: false,
            prefetch: 4,
        }
    }
}

impl GeneratorOptions {
    /// Sequential single pass, used for validation and prediction
    pub fn evaluation(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            one_shot: true,
            prefetch: 1,
        }
    }
}

/// One yielded item
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<X, Y> {
    /// Position of the item in the wrapped data array
    pub index: usize,
    pub data: X,
    pub label: Option<Y>,
}

/// A group of consecutive samples
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<X, Y> {
    pub indices: Vec<usize>,
    pub data: Vec<X>,
    /// Present when the generator wraps labels
    pub labels: Option<Vec<Y>>,
}

impl<X, Y> Batch<X, Y> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lazy, permutation-ordered walk over a data array
pub struct BatchGenerator<X, Y = usize> {
    data: Arc<Vec<X>>,
    labels: Option<Arc<Vec<Y>>>,
    idxs: Vec<usize>,
    options: GeneratorOptions,
    map_fn: Option<BatchMapFn<X>>,
    rng: ChaCha8Rng,
    cursor: usize,
}

impl<X: Clone, Y: Clone> BatchGenerator<X, Y> {
    /// Wrap all items of `data`. `labels`, when given, must have the same
    /// length as `data`.
    pub fn new(
        data: Arc<Vec<X>>,
        labels: Option<Arc<Vec<Y>>>,
        options: GeneratorOptions,
        rng: ChaCha8Rng,
    ) -> Self {
        let idxs = (0..data.len()).collect();
        Self::with_indices(data, labels, idxs, options, rng)
    }

    /// Wrap a subset of `data` given by `idxs`
    pub fn with_indices(
        data: Arc<Vec<X>>,
        labels: Option<Arc<Vec<Y>>>,
        idxs: Vec<usize>,
        options: GeneratorOptions,
        rng: ChaCha8Rng,
    ) -> Self {
        if let Some(labels) = &labels {
            debug_assert_eq!(labels.len(), data.len(), "labels and data differ in length");
        }
        debug_assert!(options.batch_size > 0, "batch size must be positive");

        let mut generator = Self {
            data,
            labels,
            idxs,
            options,
            map_fn: None,
            rng,
            cursor: 0,
        };
        generator.on_epoch_end();
        generator
    }

    /// Attach a per-batch transform (augmentation, rescaling)
    pub fn with_map_fn(mut self, map_fn: BatchMapFn<X>) -> Self {
        self.map_fn = Some(map_fn);
        self
    }

    /// Batches per pass: `ceil(N / B)` one-shot, `floor(N / B)` repeating
    pub fn len(&self) -> usize {
        let n = self.idxs.len();
        let b = self.options.batch_size;
        if self.options.one_shot {
            n.div_ceil(b)
        } else {
            n / b
        }
    }

    pub fn is_empty(&self) -> bool {
        self.idxs.is_empty()
    }

    /// Number of items in one pass
    pub fn num_items(&self) -> usize {
        self.idxs.len()
    }

    pub fn options(&self) -> GeneratorOptions {
        self.options
    }

    /// Current index permutation
    pub fn indices(&self) -> &[usize] {
        &self.idxs
    }

    /// Called at the end of every full pass
    pub fn on_epoch_end(&mut self) {
        if self.options.shuffle {
            self.idxs.shuffle(&mut self.rng);
        }
    }

    fn next_sample(&mut self) -> Option<Sample<X, Y>> {
        if self.idxs.is_empty() {
            return None;
        }
        if self.cursor >= self.idxs.len() {
            if self.options.one_shot {
                return None;
            }
            self.cursor = 0;
        }

        let index = self.idxs[self.cursor];
        self.cursor += 1;

        let sample = Sample {
            index,
            data: self.data[index].clone(),
            label: self.labels.as_ref().map(|labels| labels[index].clone()),
        };

        if self.cursor == self.idxs.len() {
            self.on_epoch_end();
        }
        Some(sample)
    }

    /// Group the item stream into batches on the calling thread
    pub fn batches(&mut self) -> Batches<'_, X, Y> {
        Batches { generator: self }
    }

    fn next_batch(&mut self) -> Option<Batch<X, Y>> {
        let capacity = self.options.batch_size;
        let mut indices = Vec::with_capacity(capacity);
        let mut data = Vec::with_capacity(capacity);
        let mut labels = self.labels.as_ref().map(|_| Vec::with_capacity(capacity));

        while data.len() < capacity {
            let Some(sample) = self.next_sample() else {
                break;
            };
            indices.push(sample.index);
            data.push(sample.data);
            if let (Some(labels), Some(label)) = (labels.as_mut(), sample.label) {
                labels.push(label);
            }
        }

        if data.is_empty() {
            return None;
        }
        if let Some(map_fn) = self.map_fn.as_mut() {
            map_fn(&mut data);
        }
        Some(Batch { indices, data, labels })
    }
}

impl<X: Clone, Y: Clone> Iterator for BatchGenerator<X, Y> {
    type Item = Sample<X, Y>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sample()
    }
}

/// Borrowing batch iterator
pub struct Batches<'a, X, Y> {
    generator: &'a mut BatchGenerator<X, Y>,
}

impl<X: Clone, Y: Clone> Iterator for Batches<'_, X, Y> {
    type Item = Batch<X, Y>;

    fn next(&mut self) -> Option<Self::Item> {
        self.generator.next_batch()
    }
}

impl<X, Y> BatchGenerator<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    /// Move batch preparation onto a producer thread. At most
    /// `options.prefetch` batches wait in the queue; dropping the returned
    /// iterator stops the producer.
    pub fn into_prefetched(mut self) -> Result<Prefetched<X, Y>> {
        let (sender, receiver) = mpsc::sync_channel(self.options.prefetch);

        let handle = thread::Builder::new()
            .name("batch-prefetch".to_string())
            .spawn(move || {
                while let Some(batch) = self.next_batch() {
                    if sender.send(batch).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Prefetched {
            receiver: Some(receiver),
            handle: Some(handle),
        })
    }
}

/// Batches delivered from a prefetch thread
pub struct Prefetched<X, Y> {
    receiver: Option<Receiver<Batch<X, Y>>>,
    handle: Option<JoinHandle<()>>,
}

impl<X, Y> Iterator for Prefetched<X, Y> {
    type Item = Batch<X, Y>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl<X, Y> Drop for Prefetched<X, Y> {
    fn drop(&mut self) {
        // Closing the channel unblocks a producer waiting on a full queue
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("batch prefetch thread panicked");
            }
        }
    }
}
