//! Epoch loop shared by both training regimes
//!
//! Pulls `steps_per_epoch` batches per epoch from a (usually prefetched,
//! endless) batch stream, takes one Adam step per batch, evaluates on the
//! validation set and lets the adaptive learning-rate controller decide
//! whether to continue, decay or stop.

use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{Batch, BatchGenerator, Example, ExampleBatcher, GeneratorOptions, TensorBatch};
use crate::model::Classifier;
use crate::training::adaptive_lr::{AdaptiveLrController, LrDecision};
use crate::utils::error::{Result, TrainerError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::EpochAccumulator;

/// Loop limits and learning-rate schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSettings {
    pub max_epochs: usize,
    pub steps_per_epoch: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Plateau length before a decay
    pub alr_epochs: usize,
    /// Number of decays before stopping
    pub alr_drops: usize,
    pub alr_decay: f64,
}

/// Labelled items addressed by index, evaluated in one pass
#[derive(Debug, Clone)]
pub struct EvalSet {
    pub data: Arc<Vec<Vec<f32>>>,
    pub labels: Arc<Vec<usize>>,
    pub indices: Vec<usize>,
}

impl EvalSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn generator(&self, batch_size: usize) -> BatchGenerator<Vec<f32>, usize> {
        BatchGenerator::with_indices(
            Arc::clone(&self.data),
            Some(Arc::clone(&self.labels)),
            self.indices.clone(),
            GeneratorOptions::evaluation(batch_size),
            ChaCha8Rng::seed_from_u64(0),
        )
    }
}

/// Per-epoch training curves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    /// Empty when training ran without a validation set
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub learning_rate: Vec<f64>,
    /// The controller ended training before `max_epochs`
    pub stopped_early: bool,
}

impl History {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Trained model and its curves
pub struct FitOutcome<M> {
    pub model: M,
    pub history: History,
}

/// Number of correct arg-max predictions in a batch
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [n] = targets.dims();
    let predictions = logits.argmax(1).reshape([n]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

fn epoch_progress(steps: usize) -> ProgressBar {
    let bar = ProgressBar::new(steps as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

fn to_tensor_batch<B: Backend, const D: usize>(
    batcher: &ExampleBatcher,
    batch: Batch<Vec<f32>, usize>,
    device: &B::Device,
) -> TensorBatch<B, D> {
    let examples = Example::from_batch(batch);
    <ExampleBatcher as Batcher<B, Example, TensorBatch<B, D>>>::batch(batcher, examples, device)
}

/// Mean loss and accuracy of `model` over `eval`
pub fn evaluate<B, M, const D: usize>(
    model: &M,
    eval: &EvalSet,
    batcher: &ExampleBatcher,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64)
where
    B: Backend,
    M: Classifier<B, D>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut acc = EpochAccumulator::new();

    let mut generator = eval.generator(batch_size.max(1));
    for batch in generator.batches() {
        let size = batch.len();
        let tensors = to_tensor_batch::<B, D>(batcher, batch, device);
        let logits = model.logits(tensors.inputs);
        let loss: f64 = loss_fn
            .forward(logits.clone(), tensors.targets.clone())
            .into_scalar()
            .elem();
        acc.add_batch(loss, count_correct(logits, tensors.targets), size);
    }

    (acc.loss(), acc.accuracy())
}

/// Train `model` on `train` until the epoch limit or the controller stops it
#[allow(clippy::too_many_arguments)]
pub fn fit<B, M, I, const D: usize>(
    mut model: M,
    optimizer: &AdamConfig,
    loss: &CrossEntropyLossConfig,
    mut train: I,
    validation: Option<&EvalSet>,
    batcher: &ExampleBatcher,
    settings: &FitSettings,
    device: &B::Device,
) -> Result<FitOutcome<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B, D>,
    M::InnerModule: Classifier<B::InnerBackend, D>,
    I: Iterator<Item = Batch<Vec<f32>, usize>>,
{
    if settings.steps_per_epoch == 0 {
        return Err(TrainerError::Training("steps_per_epoch must be positive".to_string()));
    }

    let validation = validation.filter(|v| !v.is_empty());
    let mut optim = optimizer.init::<B, M>();
    let loss_fn = loss.init(device);
    let mut controller = AdaptiveLrController::new(
        settings.learning_rate,
        settings.alr_epochs,
        settings.alr_drops,
        settings.alr_decay,
    );
    let mut logger = TrainingLogger::new(settings.max_epochs);
    let mut history = History::default();

    for epoch in 0..settings.max_epochs {
        logger.start_epoch(epoch);
        let lr = controller.learning_rate();
        let mut acc = EpochAccumulator::new();
        let bar = epoch_progress(settings.steps_per_epoch);

        for step in 0..settings.steps_per_epoch {
            let batch = train.next().ok_or_else(|| {
                TrainerError::Training(format!(
                    "batch stream ended at epoch {}, step {}",
                    epoch + 1,
                    step + 1
                ))
            })?;
            let size = batch.len();
            let tensors = to_tensor_batch::<B, D>(batcher, batch, device);

            let logits = model.logits(tensors.inputs);
            let batch_loss = loss_fn.forward(logits.clone(), tensors.targets.clone());
            let loss_value: f64 = batch_loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(TrainerError::Training(format!(
                    "loss became {} at epoch {}",
                    loss_value,
                    epoch + 1
                )));
            }
            acc.add_batch(loss_value, count_correct(logits, tensors.targets), size);

            let grads = batch_loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);

            bar.inc(1);
            bar.set_message(format!("loss {:.4}", loss_value));
        }
        bar.finish_and_clear();

        history.loss.push(acc.loss());
        history.accuracy.push(acc.accuracy());
        history.learning_rate.push(lr);

        let val_accuracy = match validation {
            Some(eval) => {
                let inner = model.valid();
                let (val_loss, val_acc) =
                    evaluate::<B::InnerBackend, M::InnerModule, D>(&inner, eval, batcher, settings.batch_size, device);
                history.val_loss.push(val_loss);
                history.val_accuracy.push(val_acc);
                Some(val_acc)
            }
            None => None,
        };
        logger.end_epoch(acc.loss(), acc.accuracy(), val_accuracy, lr);

        match controller.step(val_accuracy.unwrap_or_else(|| acc.accuracy())) {
            LrDecision::Continue => {}
            LrDecision::Decayed { lr } => logger.log_lr_decay(lr, controller.drops_remaining()),
            LrDecision::Stop => {
                logger.log_stop();
                history.stopped_early = true;
                break;
            }
        }
    }

    logger.log_complete(history.epochs());
    Ok(FitOutcome { model, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tail;
    use burn::backend::Autodiff;

    type TestBackend = burn_ndarray::NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    /// Two well separated clusters of 4-dimensional vectors
    fn clusters(n: usize) -> (Arc<Vec<Vec<f32>>>, Arc<Vec<usize>>) {
        let mut data = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = i % 2;
            let base = if label == 0 { -1.0 } else { 1.0 };
            let jitter = (i as f32 * 0.37).sin() * 0.1;
            data.push(vec![base + jitter, base - jitter, base, -base]);
            labels.push(label);
        }
        (Arc::new(data), Arc::new(labels))
    }

    fn settings(max_epochs: usize) -> FitSettings {
        FitSettings {
            max_epochs,
            steps_per_epoch: 4,
            batch_size: 8,
            learning_rate: 1e-2,
            alr_epochs: 2,
            alr_drops: 1,
            alr_decay: 0.5,
        }
    }

    fn stream(data: &Arc<Vec<Vec<f32>>>, labels: &Arc<Vec<usize>>) -> BatchGenerator<Vec<f32>, usize> {
        BatchGenerator::new(
            Arc::clone(data),
            Some(Arc::clone(labels)),
            GeneratorOptions {
                batch_size: 8,
                shuffle: true,
                one_shot: false,
                prefetch: 2,
            },
            ChaCha8Rng::seed_from_u64(3),
        )
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 1.0], [0.0, 3.0], [5.0, 1.0]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);
        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_fit_records_history_and_learns() {
        let device = Default::default();
        let (data, labels) = clusters(64);
        let mut generator = stream(&data, &labels);
        let eval = EvalSet {
            data: Arc::clone(&data),
            labels: Arc::clone(&labels),
            indices: (0..16).collect(),
        };
        let batcher = ExampleBatcher::vectors(4);
        let model = Tail::<TestAutodiffBackend>::new(4, 2, &device);

        let outcome = fit::<TestAutodiffBackend, _, _, 2>(
            model,
            &AdamConfig::new(),
            &CrossEntropyLossConfig::new(),
            generator.batches(),
            Some(&eval),
            &batcher,
            &settings(5),
            &device,
        )
        .unwrap();

        let history = &outcome.history;
        assert!(history.epochs() >= 1 && history.epochs() <= 5);
        assert_eq!(history.val_accuracy.len(), history.epochs());
        assert_eq!(history.learning_rate.len(), history.epochs());

        let (_, accuracy) = evaluate::<TestBackend, _, 2>(&outcome.model.valid(), &eval, &batcher, 8, &device);
        assert!(accuracy > 0.9, "accuracy {}", accuracy);
    }

    #[test]
    fn test_fit_without_validation_uses_training_accuracy() {
        let device = Default::default();
        let (data, labels) = clusters(32);
        let mut generator = stream(&data, &labels);
        let model = Tail::<TestAutodiffBackend>::new(4, 2, &device);

        let outcome = fit::<TestAutodiffBackend, _, _, 2>(
            model,
            &AdamConfig::new(),
            &CrossEntropyLossConfig::new(),
            generator.batches(),
            None,
            &ExampleBatcher::vectors(4),
            &settings(1),
            &device,
        )
        .unwrap();

        assert_eq!(outcome.history.epochs(), 1);
        assert!(outcome.history.val_accuracy.is_empty());
        assert!((0.0..=1.0).contains(&outcome.history.accuracy[0]));
    }

    #[test]
    fn test_exhausted_stream_is_an_error() {
        let device = Default::default();
        let model = Tail::<TestAutodiffBackend>::new(4, 2, &device);

        let result = fit::<TestAutodiffBackend, _, _, 2>(
            model,
            &AdamConfig::new(),
            &CrossEntropyLossConfig::new(),
            std::iter::empty(),
            None,
            &ExampleBatcher::vectors(4),
            &settings(1),
            &device,
        );
        assert!(matches!(result, Err(TrainerError::Training(_))));
    }
}
