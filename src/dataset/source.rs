//! Image data source
//!
//! Loads a directory with one sub-directory per class, applies the class
//! mapping and minimum-count policy, decodes every image at the configured
//! geometry and keeps the rescaled pixels in memory together with labels,
//! filenames and the train/test split.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DataParams;
use crate::dataset::split::{stratified_split, DatasetSplit};
use crate::dataset::ImageShape;
use crate::model::ArchitectureTag;
use crate::utils::error::{Result, TrainerError};

/// Pixel values are divided by this on load
pub const RESCALE_DIVISOR: f32 = 255.0;

/// Label of the bucket collecting under-represented classes
pub const OTHERS_CLASS: &str = "others";

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// How source pixels are mapped onto input channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Rgb,
    Greyscale,
    /// Greyscale replicated into three identical channels
    Greyscale3,
}

impl ColorMode {
    /// Colour images stay RGB; greyscale input to a transfer-learning
    /// backbone is replicated to three channels.
    pub fn resolve(img_channels: usize, tag: ArchitectureTag) -> Self {
        if img_channels == 3 {
            ColorMode::Rgb
        } else if tag.is_transfer() {
            ColorMode::Greyscale3
        } else {
            ColorMode::Greyscale
        }
    }

    pub fn channels(self) -> usize {
        match self {
            ColorMode::Greyscale => 1,
            ColorMode::Rgb | ColorMode::Greyscale3 => 3,
        }
    }
}

/// In-memory labelled image set
#[derive(Debug, Clone)]
pub struct DataSource {
    /// CHW pixel arrays in `[0, 1]`
    pub images: Arc<Vec<Vec<f32>>>,
    pub labels: Arc<Vec<usize>>,
    /// Source file of every image
    pub filenames: Vec<String>,
    /// Label names, indexed by class
    pub class_names: Vec<String>,
    pub shape: ImageShape,
    /// Where the images came from
    pub origin: String,
    split: DatasetSplit,
}

impl DataSource {
    /// Build a data source from already decoded images
    pub fn from_parts(
        images: Vec<Vec<f32>>,
        labels: Vec<usize>,
        filenames: Vec<String>,
        class_names: Vec<String>,
        shape: ImageShape,
        origin: &str,
    ) -> Result<Self> {
        if images.len() != labels.len() || images.len() != filenames.len() {
            return Err(TrainerError::Dataset(format!(
                "length mismatch: {} images, {} labels, {} filenames",
                images.len(),
                labels.len(),
                filenames.len()
            )));
        }
        if images.is_empty() {
            return Err(TrainerError::Dataset("no images".to_string()));
        }
        if let Some(bad) = images.iter().position(|img| img.len() != shape.len()) {
            return Err(TrainerError::Dataset(format!(
                "image {} has {} values, expected {} for {}",
                filenames[bad],
                images[bad].len(),
                shape.len(),
                shape
            )));
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= class_names.len()) {
            return Err(TrainerError::Dataset(format!(
                "label {} out of range for {} classes",
                label,
                class_names.len()
            )));
        }

        let split = DatasetSplit::train_only(images.len());
        Ok(Self {
            images: Arc::new(images),
            labels: Arc::new(labels),
            filenames,
            class_names,
            shape,
            origin: origin.to_string(),
            split,
        })
    }

    /// Load every image below `params.input_source`
    pub fn load_directory(params: &DataParams, height: usize, width: usize, mode: ColorMode) -> Result<Self> {
        let root = &params.input_source;
        info!("Loading images from {:?}", root);
        if !root.is_dir() {
            return Err(TrainerError::PathNotFound(root.clone()));
        }

        let files = discover_files(root)?;
        let (files, class_names) = assign_classes(files, params);
        if files.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "no classes with at least {} images in {:?}",
                params.data_min_count, root
            )));
        }
        info!(
            "Found {} images in {} classes",
            files.len(),
            class_names.len()
        );

        let shape = ImageShape::new(mode.channels(), height, width);
        let images: Vec<Vec<f32>> = files
            .par_iter()
            .map(|(path, _)| load_image(path, shape, mode))
            .collect::<Result<_>>()?;

        let filenames = files.iter().map(|(p, _)| p.to_string_lossy().to_string()).collect();
        let labels = files.iter().map(|(_, l)| *l).collect();

        Self::from_parts(
            images,
            labels,
            filenames,
            class_names,
            shape,
            &root.to_string_lossy(),
        )
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Images per class over the whole data source
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for &label in self.labels.iter() {
            counts[label] += 1;
        }
        counts
    }

    /// Partition into train and test sets
    pub fn split(&mut self, fraction: f64, offset: usize, rng: &mut ChaCha8Rng) -> Result<()> {
        self.split = stratified_split(&self.labels, fraction, offset, rng)?;
        if self.split.train.is_empty() {
            return Err(TrainerError::Dataset("training split is empty".to_string()));
        }
        info!(
            "Split: {} train, {} test",
            self.split.train.len(),
            self.split.test.len()
        );
        Ok(())
    }

    pub fn train_indices(&self) -> &[usize] {
        &self.split.train
    }

    pub fn test_indices(&self) -> &[usize] {
        &self.split.test
    }

    pub fn test_labels(&self) -> Vec<usize> {
        self.split.test.iter().map(|&i| self.labels[i]).collect()
    }

    /// Inverse-frequency weights from the training partition:
    /// `total / (num_classes * count)`, 1.0 for classes absent from training
    pub fn class_weights(&self) -> Vec<f32> {
        let num_classes = self.num_classes();
        let mut counts = vec![0usize; num_classes];
        for &i in &self.split.train {
            counts[self.labels[i]] += 1;
        }
        let total = self.split.train.len() as f32;
        counts
            .iter()
            .map(|&count| {
                if count > 0 {
                    total / (num_classes as f32 * count as f32)
                } else {
                    1.0
                }
            })
            .collect()
    }

    /// File name without directories, used in reports
    pub fn short_filename(&self, index: usize) -> String {
        Path::new(&self.filenames[index])
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filenames[index].clone())
    }
}

/// All image files, grouped by their class directory name
fn discover_files(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut by_dir: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping non UTF-8 directory {:?}", entry.path());
            continue;
        };

        let mut files: Vec<PathBuf> = WalkDir::new(entry.path())
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| is_image(p))
            .collect();
        files.sort();
        debug!("Directory '{}': {} images", dir_name, files.len());
        by_dir.insert(dir_name, files);
    }

    Ok(by_dir)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Map directories to class labels, then drop or merge small classes.
/// Returns `(path, label)` pairs and the sorted label names.
fn assign_classes(
    by_dir: BTreeMap<String, Vec<PathBuf>>,
    params: &DataParams,
) -> (Vec<(PathBuf, usize)>, Vec<String>) {
    let mut by_class: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for (dir, files) in by_dir {
        let class = params.class_mapping.get(&dir).cloned().unwrap_or(dir);
        by_class.entry(class).or_default().extend(files);
    }

    let mut kept: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut others: Vec<PathBuf> = Vec::new();
    for (class, files) in by_class {
        if files.len() >= params.data_min_count {
            kept.entry(class).or_default().extend(files);
        } else if params.data_map_others {
            debug!("Class '{}' ({} images) mapped to '{}'", class, files.len(), OTHERS_CLASS);
            others.extend(files);
        } else {
            debug!("Class '{}' dropped ({} images)", class, files.len());
        }
    }
    if !others.is_empty() {
        kept.entry(OTHERS_CLASS.to_string()).or_default().extend(others);
    }

    let class_names: Vec<String> = kept.keys().cloned().collect();
    let unique: BTreeSet<&String> = class_names.iter().collect();
    debug_assert_eq!(unique.len(), class_names.len());

    let files = kept
        .into_values()
        .enumerate()
        .flat_map(|(label, files)| files.into_iter().map(move |p| (p, label)))
        .collect();

    (files, class_names)
}

/// Decode, resize and rescale one image into CHW layout
fn load_image(path: &Path, shape: ImageShape, mode: ColorMode) -> Result<Vec<f32>> {
    let img = ImageReader::open(path)
        .map_err(|e| TrainerError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| TrainerError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .resize_exact(shape.width as u32, shape.height as u32, FilterType::Triangle);

    Ok(image_to_chw(&img, shape, mode))
}

pub(crate) fn image_to_chw(img: &DynamicImage, shape: ImageShape, mode: ColorMode) -> Vec<f32> {
    let plane = shape.height * shape.width;
    let mut data = vec![0.0f32; shape.len()];

    match mode {
        ColorMode::Rgb => {
            let rgb = img.to_rgb8();
            for (i, pixel) in rgb.pixels().enumerate().take(plane) {
                for c in 0..3 {
                    data[c * plane + i] = pixel[c] as f32 / RESCALE_DIVISOR;
                }
            }
        }
        ColorMode::Greyscale | ColorMode::Greyscale3 => {
            let luma = img.to_luma8();
            for (i, pixel) in luma.pixels().enumerate().take(plane) {
                let v = pixel[0] as f32 / RESCALE_DIVISOR;
                for c in 0..shape.channels {
                    data[c * plane + i] = v;
                }
            }
        }
    }

    data
}
