//! Training orchestrator
//!
//! Runs one complete training job:
//! 1. resolve the colour mode, load and split the data
//! 2. train, either end to end on augmented images or, for transfer tags,
//!    a dense tail on vectors from a frozen backbone
//! 3. switch to inference mode, evaluate on the test split, time inference
//! 4. write plots, the result record, the optional mislabel report, the
//!    Model Info record and the weights into a timestamped directory
//!
//! Nothing is written to disk until training has finished. Outputs go to a
//! hidden staging directory that is renamed into place once complete, so a
//! failed run leaves no output directory behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::{
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    record::{CompactRecorder, FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::Local;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::backend::{streams, Session};
use crate::config::{save_toml_config, SaveMode, TrainingConfig};
use crate::dataset::{
    Augmenter, BatchGenerator, ColorMode, DataSource, ExampleBatcher, GeneratorOptions, ImageShape,
};
use crate::inference::latency::LatencyReport;
use crate::inference::{extract_features, map_batches, measure_inference_latency, predict};
use crate::model::{build_network, build_transfer, compose, ArchitectureTag, ModelMode, Network};
use crate::training::fit::{fit, EvalSet, FitSettings, History};
use crate::training::mislabel::{find_mislabeled, write_mislabel_report, MISLABEL_FILE, NEIGHBOURS};
use crate::training::model_info::ModelInfo;
use crate::training::result::{default_description, TrainingResult};
use crate::utils::charts::{
    generate_confusion_matrix_chart, generate_line_chart, generate_precision_recall_chart, DataSeries,
    COLOR_PRIMARY, COLOR_SECONDARY,
};
use crate::utils::error::{Result, TrainerError};
use crate::utils::format_duration;
use crate::utils::logging::ProgressLogger;

/// File stem of the saved weights inside `<save_dir>/model/`
pub const MODEL_FILE_STEM: &str = "model";

pub const RESULT_FILE: &str = "training_result.json";

/// Effective configuration of the run, next to its outputs
pub const CONFIG_FILE: &str = "config.toml";

/// Everything a finished run hands back
pub struct TrainingOutcome<B: Backend> {
    /// Trained network in inference mode
    pub model: Network<B>,
    pub mode: ModelMode,
    pub data_source: DataSource,
    pub result: TrainingResult,
    pub info: ModelInfo,
    /// Timing of the leading images of the data source
    pub latency: LatencyReport,
    pub save_dir: PathBuf,
}

/// Optimiser steps per epoch: `floor(train / batch)`, or `ceil` when the
/// trailing partial batch should be covered; never less than one
pub fn steps_per_epoch(train_count: usize, batch_size: usize, cover_partial_batch: bool) -> usize {
    let batch_size = batch_size.max(1);
    let steps = if cover_partial_batch {
        train_count.div_ceil(batch_size)
    } else {
        train_count / batch_size
    };
    steps.max(1)
}

fn fit_settings(config: &TrainingConfig, train_count: usize) -> FitSettings {
    let t = &config.training;
    FitSettings {
        max_epochs: t.max_epochs,
        steps_per_epoch: steps_per_epoch(train_count, t.batch_size, t.cover_partial_batch),
        batch_size: t.batch_size,
        learning_rate: t.learning_rate,
        alr_epochs: t.alr_epochs,
        alr_drops: t.alr_drops,
        alr_decay: t.alr_decay,
    }
}

fn weighted_loss(loss: CrossEntropyLossConfig, class_weights: Option<Vec<f32>>) -> CrossEntropyLossConfig {
    match class_weights {
        Some(weights) => loss.with_weights(Some(weights)),
        None => loss,
    }
}

fn training_generator(
    data: Arc<Vec<Vec<f32>>>,
    source: &DataSource,
    config: &TrainingConfig,
    rng: ChaCha8Rng,
) -> BatchGenerator<Vec<f32>, usize> {
    BatchGenerator::with_indices(
        data,
        Some(Arc::clone(&source.labels)),
        source.train_indices().to_vec(),
        GeneratorOptions {
            batch_size: config.training.batch_size,
            shuffle: true,
            one_shot: false,
            prefetch: config.training.prefetch,
        },
        rng,
    )
}

fn validation_set(data: Arc<Vec<Vec<f32>>>, source: &DataSource) -> Option<EvalSet> {
    (!source.test_indices().is_empty()).then(|| EvalSet {
        data,
        labels: Arc::clone(&source.labels),
        indices: source.test_indices().to_vec(),
    })
}

/// Training batches of images; augmentation applies to these batches only
fn image_generator<B: Backend>(
    config: &TrainingConfig,
    source: &DataSource,
    session: &Session<B>,
) -> BatchGenerator<Vec<f32>, usize> {
    let generator = training_generator(
        Arc::clone(&source.images),
        source,
        config,
        session.rng(streams::TRAIN_SHUFFLE),
    );
    let augmenter = Augmenter::new(config.augmentation.clone(), source.shape);
    if !config.training.use_augmentation || augmenter.config().is_identity() {
        return generator;
    }
    let mut rng = session.rng(streams::AUGMENT);
    generator.with_map_fn(Box::new(move |images: &mut [Vec<f32>]| {
        augmenter.augment_batch(images, &mut rng)
    }))
}

/// End-to-end training on augmented images
fn train_direct<B: AutodiffBackend>(
    config: &TrainingConfig,
    source: &DataSource,
    class_weights: Option<Vec<f32>>,
    session: &Session<B>,
) -> Result<(Network<B>, History)> {
    let compiled = build_network::<B>(config, source.num_classes(), &session.device)?;

    let generator = image_generator(config, source, session);
    let settings = fit_settings(config, source.train_indices().len());
    info!(
        "Training {} on {} images: {} steps of {} per epoch",
        config.model.architecture,
        source.train_indices().len(),
        settings.steps_per_epoch,
        settings.batch_size
    );

    let validation = validation_set(Arc::clone(&source.images), source);
    let outcome = fit::<B, Network<B>, _, 4>(
        compiled.model,
        &compiled.optimizer,
        &weighted_loss(compiled.loss, class_weights),
        generator.into_prefetched()?,
        validation.as_ref(),
        &ExampleBatcher::images(source.shape),
        &settings,
        &session.device,
    )?;

    Ok((outcome.model, outcome.history))
}

/// Tail training on vectors from a frozen backbone, then composition
fn train_transfer<B: AutodiffBackend>(
    config: &TrainingConfig,
    source: &DataSource,
    class_weights: Option<Vec<f32>>,
    session: &Session<B>,
) -> Result<(Network<B>, History)> {
    let (head, compiled) = build_transfer::<B>(config, source.num_classes(), &session.device)?;

    // Backbone runs in inference mode so batch norm keeps its running statistics
    let extractor = head.valid();
    let all: Vec<usize> = (0..source.len()).collect();
    let mut progress = ProgressLogger::new("Backbone features", all.len());
    let vectors = map_batches::<B::InnerBackend, _, 4>(
        &source.images,
        &all,
        &ExampleBatcher::images(source.shape),
        config.training.batch_size,
        &session.device,
        |x| {
            progress.advance(x.dims()[0]);
            extractor.embed(x)
        },
    )?;
    progress.finish();
    let vectors = Arc::new(vectors);

    let generator = training_generator(
        Arc::clone(&vectors),
        source,
        config,
        session.rng(streams::TAIL_SHUFFLE),
    );
    let settings = fit_settings(config, source.train_indices().len());
    let validation = validation_set(Arc::clone(&vectors), source);

    let outcome = fit::<B, _, _, 2>(
        compiled.model,
        &compiled.optimizer,
        &weighted_loss(compiled.loss, class_weights),
        generator.into_prefetched()?,
        validation.as_ref(),
        &ExampleBatcher::vectors(head.feature_len()),
        &settings,
        &session.device,
    )?;

    Ok((compose(head, outcome.model), outcome.history))
}

fn load_source(config: &TrainingConfig, supplied: Option<DataSource>, mode: ColorMode) -> Result<DataSource> {
    let expected = ImageShape::new(mode.channels(), config.model.img_height, config.model.img_width);
    let source = match supplied {
        Some(source) => source,
        None => DataSource::load_directory(
            &config.data,
            config.model.img_height,
            config.model.img_width,
            mode,
        )?,
    };

    if source.shape != expected {
        return Err(TrainerError::Dataset(format!(
            "data source images are {} but the model expects {}",
            source.shape, expected
        )));
    }
    if source.num_classes() < 2 {
        return Err(TrainerError::Dataset(format!(
            "need at least 2 classes, found {}",
            source.num_classes()
        )));
    }
    Ok(source)
}

fn write_plots(dir: &Path, history: &History, result: &TrainingResult) -> Result<()> {
    let curves = |train: &[f64], val: &[f64]| {
        let mut series = vec![DataSeries::new("train", train.to_vec(), COLOR_PRIMARY)];
        if !val.is_empty() {
            series.push(DataSeries::new("validation", val.to_vec(), COLOR_SECONDARY));
        }
        series
    };

    generate_line_chart(
        "Loss",
        "Epoch",
        "Loss",
        &curves(&history.loss, &history.val_loss),
        &dir.join("loss_vs_epoch.svg"),
    )?;
    generate_line_chart(
        "Accuracy",
        "Epoch",
        "Accuracy",
        &curves(&history.accuracy, &history.val_accuracy),
        &dir.join("accuracy_vs_epoch.svg"),
    )?;

    if !result.y_true.is_empty() {
        let metrics = result.metrics();
        generate_confusion_matrix_chart(
            "Confusion matrix",
            &metrics.confusion_matrix,
            &result.class_names,
            &dir.join("confusion_matrix.svg"),
        )?;
        generate_precision_recall_chart(
            "Precision and recall",
            &metrics,
            &result.class_names,
            &dir.join("precision_recall.svg"),
        )?;
    }
    Ok(())
}

/// Train, evaluate and save an image classifier
///
/// `data_source` is loaded from `config.data.input_source` when `None`.
pub fn train_image_classification_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    data_source: Option<DataSource>,
    session: &Session<B>,
) -> Result<TrainingOutcome<B::InnerBackend>> {
    config.validate()?;
    let tag: ArchitectureTag = config.model.architecture.parse()?;
    let color_mode = ColorMode::resolve(config.model.img_channels, tag);
    info!("Architecture {}, colour mode {:?}", tag, color_mode);

    let mut source = load_source(config, data_source, color_mode)?;
    source.split(
        config.data.data_split,
        config.data.data_split_offset,
        &mut session.rng(streams::SPLIT),
    )?;
    info!(
        "{} images in {} classes: {} train, {} test",
        source.len(),
        source.num_classes(),
        source.train_indices().len(),
        source.test_indices().len()
    );

    let class_weights = config.training.use_class_weights.then(|| source.class_weights());

    let start = Instant::now();
    let (trained, history) = if tag.is_transfer() {
        train_transfer(config, &source, class_weights, session)?
    } else {
        train_direct(config, &source, class_weights, session)?
    };
    let training_time = start.elapsed().as_secs_f64();
    info!("Training finished in {}", format_duration(training_time));

    let model = trained.valid();
    let mode = ModelMode::Inference;
    let device = &session.device;
    let batcher = ExampleBatcher::images(source.shape);
    let batch_size = config.training.batch_size;

    let test_indices = source.test_indices().to_vec();
    let predictions = predict::<B::InnerBackend, _, 4>(&model, &source.images, &test_indices, &batcher, batch_size, device)?;

    // Timed on the leading images of the whole source, test split or not
    let all: Vec<usize> = (0..source.len()).collect();
    let latency = measure_inference_latency::<B::InnerBackend, _, 4>(
        &model,
        &source.images,
        &all,
        &batcher,
        batch_size,
        device,
    )?;

    let result = TrainingResult::new(
        &config.name,
        tag.as_str(),
        source.class_names.clone(),
        history.clone(),
        test_indices,
        source.test_labels(),
        predictions.probabilities,
        predictions.classes,
        training_time,
        latency.median_ms_per_image,
    );
    if result.y_true.is_empty() {
        warn!("No test split, skipping evaluation metrics");
    } else {
        info!("\n{}", result.metrics().display());
    }

    let vectors = extract_features::<B::InnerBackend, _, 4>(&model, &source.images, &all, &batcher, batch_size, device)?;

    let description = match &config.description {
        Some(text) => text.clone(),
        None => default_description(
            &config.name,
            tag.as_str(),
            &source.origin,
            source.len(),
            source.num_classes(),
            &result,
        ),
    };
    let timestamp = Local::now();
    let info = ModelInfo::new(
        &config.name,
        &description,
        tag.as_str(),
        &timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        saved_model_file(config.output.save_model),
        saved_model_mode(config.output.save_model),
        color_mode,
        source.shape,
        vectors.first().map(Vec::len).unwrap_or(0),
        source.class_counts(),
        &source.origin,
        config.data.data_split,
        &result,
    );

    let dir_name = format!("{}_{}", config.name, timestamp.format("%Y%m%d-%H%M%S"));
    let save_dir = config.output.output_dir.join(&dir_name);
    let staging = config.output.output_dir.join(format!(".{}.partial", dir_name));
    info!("Saving results to {:?}", save_dir);

    let artifacts = RunArtifacts {
        config,
        source: &source,
        history: &history,
        result: &result,
        info: &info,
        vectors: &vectors,
    };
    publish_dir(&staging, &save_dir, |dir| artifacts.write(dir, &model, &trained))?;

    Ok(TrainingOutcome {
        model,
        mode,
        data_source: source,
        result,
        info,
        latency,
        save_dir,
    })
}

/// Run `write` against `staging`, then rename it to `target`
///
/// On failure the staging directory is removed and `target` never appears.
fn publish_dir<F>(staging: &Path, target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let written = write(staging).and_then(|()| fs::rename(staging, target).map_err(TrainerError::from));
    if written.is_err() && staging.exists() {
        if let Err(e) = fs::remove_dir_all(staging) {
            warn!("Could not remove incomplete output {:?}: {}", staging, e);
        }
    }
    written
}

/// Weights file named in Model Info, relative to the info file
fn saved_model_file(save_mode: SaveMode) -> Option<PathBuf> {
    match save_mode {
        SaveMode::Frozen | SaveMode::Unfrozen => Some(PathBuf::from(format!("{}.mpk", MODEL_FILE_STEM))),
        SaveMode::None => None,
    }
}

/// Mode of the saved weights: unfrozen saves keep the training-mode network
fn saved_model_mode(save_mode: SaveMode) -> ModelMode {
    match save_mode {
        SaveMode::Unfrozen => ModelMode::Training,
        SaveMode::Frozen | SaveMode::None => ModelMode::Inference,
    }
}

/// Everything written into a run's output directory
struct RunArtifacts<'a> {
    config: &'a TrainingConfig,
    source: &'a DataSource,
    history: &'a History,
    result: &'a TrainingResult,
    info: &'a ModelInfo,
    vectors: &'a [Vec<f32>],
}

impl RunArtifacts<'_> {
    fn write<B: AutodiffBackend>(
        &self,
        dir: &Path,
        model: &Network<B::InnerBackend>,
        trained: &Network<B>,
    ) -> Result<()> {
        let model_dir = dir.join("model");
        fs::create_dir_all(&model_dir)?;

        save_toml_config(self.config, &dir.join(CONFIG_FILE))?;
        write_plots(dir, self.history, self.result)?;
        self.result.save(&dir.join(RESULT_FILE))?;

        if self.config.output.save_mislabeled {
            let source = self.source;
            let candidates = find_mislabeled(self.vectors, &source.labels, source.num_classes(), NEIGHBOURS)?;
            let filenames: Vec<String> = (0..source.len()).map(|i| source.short_filename(i)).collect();
            write_mislabel_report(&dir.join(MISLABEL_FILE), &candidates, &filenames, &source.class_names)?;
        }

        match self.config.output.save_model {
            SaveMode::Frozen => model
                .clone()
                .save_file(model_dir.join(MODEL_FILE_STEM), &CompactRecorder::new())
                .map_err(|e| TrainerError::Model(format!("Failed to save model: {:?}", e)))?,
            SaveMode::Unfrozen => trained
                .clone()
                .save_file(
                    model_dir.join(MODEL_FILE_STEM),
                    &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                )
                .map_err(|e| TrainerError::Model(format!("Failed to save model: {:?}", e)))?,
            SaveMode::None => {}
        }

        self.info.save(&model_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_toml_config, GlobalPooling};
    use crate::dataset::AugmentationConfig;
    use burn::backend::Autodiff;
    use rand::SeedableRng;

    type TestBackend = burn_ndarray::NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    /// `per_class` dark and `per_class` bright images with a little texture
    fn toy_source(per_class: usize, channels: usize, side: usize) -> DataSource {
        let shape = ImageShape::new(channels, side, side);
        let mut images = Vec::new();
        let mut labels = Vec::new();
        let mut filenames = Vec::new();
        for label in 0..2 {
            for i in 0..per_class {
                let base = if label == 0 { 0.2 } else { 0.8 };
                let image: Vec<f32> = (0..shape.len())
                    .map(|p| base + 0.05 * (((p * 7 + i * 13) % 11) as f32 / 11.0 - 0.5))
                    .collect();
                images.push(image);
                labels.push(label);
                filenames.push(format!("class{}/img_{:03}.png", label, i));
            }
        }
        DataSource::from_parts(
            images,
            labels,
            filenames,
            vec!["dark".to_string(), "bright".to_string()],
            shape,
            "toy",
        )
        .unwrap()
    }

    fn toy_config(architecture: &str, channels: usize, output: &Path) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.name = "toy".to_string();
        config.model.architecture = architecture.to_string();
        config.model.img_height = 32;
        config.model.img_width = 32;
        config.model.img_channels = channels;
        config.model.filters = 2;
        config.model.global_pooling = GlobalPooling::Avg;
        config.training.batch_size = 16;
        config.training.max_epochs = 1;
        config.training.prefetch = 2;
        config.data.data_split = 0.2;
        config.output.output_dir = output.to_path_buf();
        config.output.save_model = SaveMode::None;
        config
    }

    #[test]
    fn test_steps_per_epoch() {
        assert_eq!(steps_per_epoch(80, 16, false), 5);
        assert_eq!(steps_per_epoch(85, 16, false), 5);
        assert_eq!(steps_per_epoch(85, 16, true), 6);
        assert_eq!(steps_per_epoch(3, 16, false), 1);
    }

    #[test]
    fn test_end_to_end_base_cyclic() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_config("base_cyclic", 1, dir.path());
        let session = Session::<TestAutodiffBackend>::with_default_device(42);

        let outcome = train_image_classification_model(&config, Some(toy_source(50, 1, 32)), &session).unwrap();
        let result = &outcome.result;

        assert_eq!(result.support.iter().sum::<usize>(), 20);
        assert!((0.0..=1.0).contains(&result.accuracy));
        assert_eq!(result.epochs_run(), 1);
        assert_eq!(result.y_prob.len(), 20);
        assert_eq!(outcome.mode, ModelMode::Inference);

        let save_dir = &outcome.save_dir;
        assert!(save_dir.starts_with(dir.path()));
        assert!(save_dir.join(RESULT_FILE).exists());
        assert!(save_dir.join("loss_vs_epoch.svg").exists());
        assert!(save_dir.join("confusion_matrix.svg").exists());
        assert!(save_dir.join("model/network_info.xml").exists());
        assert!(!save_dir.join("model/model.mpk").exists());
        assert_eq!(outcome.info.outputs[1].shape, vec![512]);
        assert_eq!(outcome.info.model_mode, ModelMode::Inference);

        // Timed on the first images of the whole source, not the 20 test images
        assert_eq!(outcome.latency.samples, 100);

        let saved: TrainingConfig = load_toml_config(&save_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(saved.name, "toy");
        assert_eq!(saved.model.architecture, "base_cyclic");
        assert_eq!(saved.training.batch_size, 16);
        assert_eq!(saved.training.alr_drops, config.training.alr_drops);
        assert_eq!(saved.data.data_split, 0.2);

        // Only the published directory remains, no staging leftovers
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(entries, vec![save_dir.clone()]);
    }

    #[test]
    fn test_augmentation_applies_to_training_batches_only() {
        let source = {
            let mut source = toy_source(10, 1, 32);
            source.split(0.2, 0, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
            source
        };
        let dir = tempfile::tempdir().unwrap();
        let mut config = toy_config("base_cyclic", 1, dir.path());
        config.training.batch_size = 4;
        config.augmentation = AugmentationConfig {
            bias: [0.1, 0.1],
            ..AugmentationConfig::none()
        };
        let session = Session::<TestAutodiffBackend>::with_default_device(42);

        config.training.use_augmentation = true;
        let batch = image_generator(&config, &source, &session).batches().next().unwrap();
        for (index, image) in batch.indices.iter().zip(&batch.data) {
            let original = &source.images[*index];
            for (a, o) in image.iter().zip(original) {
                assert!((a - (o + 0.1).min(1.0)).abs() < 1e-5);
            }
        }

        config.training.use_augmentation = false;
        let batch = image_generator(&config, &source, &session).batches().next().unwrap();
        for (index, image) in batch.indices.iter().zip(&batch.data) {
            assert_eq!(image, &source.images[*index]);
        }

        // Validation reads the stored images directly
        let validation = validation_set(Arc::clone(&source.images), &source).unwrap();
        assert!(Arc::ptr_eq(&validation.data, &source.images));
        assert_eq!(validation.indices, source.test_indices());
    }

    #[test]
    fn test_saved_model_mode() {
        assert_eq!(saved_model_mode(SaveMode::Unfrozen), ModelMode::Training);
        assert_eq!(saved_model_mode(SaveMode::Frozen), ModelMode::Inference);
        assert_eq!(saved_model_mode(SaveMode::None), ModelMode::Inference);
        assert!(saved_model_file(SaveMode::None).is_none());
    }

    #[test]
    fn test_failed_write_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join(".run.partial");
        let target = dir.path().join("run");

        let result = publish_dir(&staging, &target, |d| {
            fs::create_dir_all(d.join("model"))?;
            fs::write(d.join(RESULT_FILE), "{}")?;
            Err(TrainerError::Model("disk full".to_string()))
        });

        assert!(matches!(result, Err(TrainerError::Model(_))));
        assert!(!staging.exists());
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_successful_write_is_renamed_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join(".run.partial");
        let target = dir.path().join("run");

        publish_dir(&staging, &target, |d| {
            fs::create_dir_all(d)?;
            fs::write(d.join(RESULT_FILE), "{}")?;
            Ok(())
        })
        .unwrap();

        assert!(!staging.exists());
        assert!(target.join(RESULT_FILE).exists());
    }

    #[test]
    fn test_end_to_end_transfer_with_mislabel_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = toy_config("resnet18_tl", 1, dir.path());
        config.output.save_mislabeled = true;
        config.output.save_model = SaveMode::Unfrozen;
        let session = Session::<TestAutodiffBackend>::with_default_device(7);

        // Greyscale input to a transfer backbone is replicated to 3 channels
        let outcome = train_image_classification_model(&config, Some(toy_source(15, 3, 32)), &session).unwrap();

        assert_eq!(outcome.result.support.iter().sum::<usize>(), 6);
        assert_eq!(outcome.info.color_mode, ColorMode::Greyscale3);
        assert!(outcome.save_dir.join(MISLABEL_FILE).exists());
        assert!(outcome.save_dir.join("model/model.mpk").exists());
        assert_eq!(outcome.info.model_mode, ModelMode::Training);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_config("base_cyclic", 1, dir.path());
        let session = Session::<TestAutodiffBackend>::with_default_device(42);

        let result = train_image_classification_model(&config, Some(toy_source(10, 1, 16)), &session);
        assert!(matches!(result, Err(TrainerError::Dataset(_))));
        // Nothing written for a failed run
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_architecture_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_config("not_a_real_model", 1, dir.path());
        let session = Session::<TestAutodiffBackend>::with_default_device(42);

        let result = train_image_classification_model(&config, None, &session);
        assert!(matches!(result, Err(TrainerError::Config(_))));
    }
}
