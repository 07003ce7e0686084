//! Model Info record
//!
//! Describes a saved network for downstream inference tools: where the
//! weights are, which named tensors go in and come out, the class labels,
//! how input pixels were normalised and how well the network did.
//! Written as `model/network_info.xml` next to the weights.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{ColorMode, ImageShape};
use crate::model::ModelMode;
use crate::training::result::TrainingResult;
use crate::utils::charts::escape_xml;
use crate::utils::error::Result;

pub const NETWORK_INFO_FILE: &str = "network_info.xml";

/// A named tensor of the saved network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorBinding {
    pub name: String,
    /// Shape without the batch axis
    pub shape: Vec<usize>,
}

impl TensorBinding {
    pub fn new(name: &str, shape: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            shape,
        }
    }
}

/// Durable description of a trained network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub description: String,
    pub architecture: String,
    pub date: String,
    /// Weights file relative to the info file, absent when not saved
    pub model_file: Option<PathBuf>,
    pub model_mode: ModelMode,
    pub color_mode: ColorMode,
    pub inputs: Vec<TensorBinding>,
    pub outputs: Vec<TensorBinding>,
    pub labels: Vec<String>,
    /// Images per label in the whole data source
    pub counts: Vec<usize>,
    pub prepro_name: String,
    pub prepro_params: Vec<f64>,
    pub source_data: String,
    pub data_split: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
    /// Per-class test metrics, indexed like `labels`
    pub class_precision: Vec<f64>,
    pub class_recall: Vec<f64>,
    pub class_f1: Vec<f64>,
    pub class_support: Vec<usize>,
    pub training_epochs: usize,
    pub training_time: f64,
    pub inference_time_per_image: f64,
}

impl ModelInfo {
    /// Assemble the record from the run's outputs
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        description: &str,
        architecture: &str,
        date: &str,
        model_file: Option<PathBuf>,
        model_mode: ModelMode,
        color_mode: ColorMode,
        shape: ImageShape,
        vector_len: usize,
        counts: Vec<usize>,
        source_data: &str,
        data_split: f64,
        result: &TrainingResult,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            architecture: architecture.to_string(),
            date: date.to_string(),
            model_file,
            model_mode,
            color_mode,
            inputs: vec![TensorBinding::new("image", shape.dims().to_vec())],
            outputs: vec![
                TensorBinding::new("pred", vec![result.class_names.len()]),
                TensorBinding::new("vector", vec![vector_len]),
            ],
            labels: result.class_names.clone(),
            counts,
            prepro_name: "rescale".to_string(),
            prepro_params: vec![255.0, 0.0, 1.0],
            source_data: source_data.to_string(),
            data_split,
            accuracy: result.accuracy,
            precision: result.mean_precision,
            recall: result.mean_recall,
            f1: result.mean_f1,
            support: result.support.iter().sum(),
            class_precision: result.precision.clone(),
            class_recall: result.recall.clone(),
            class_f1: result.f1.clone(),
            class_support: result.support.clone(),
            training_epochs: result.epochs_run(),
            training_time: result.training_time,
            inference_time_per_image: result.inference_time_per_image,
        }
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<network>\n");

        element(&mut xml, 1, "name", &self.name);
        element(&mut xml, 1, "description", &self.description);
        element(&mut xml, 1, "type", &self.architecture);
        element(&mut xml, 1, "date", &self.date);
        if let Some(file) = &self.model_file {
            element(&mut xml, 1, "model_file", &file.to_string_lossy());
        }
        element(&mut xml, 1, "model_mode", &self.model_mode.to_string());
        element(&mut xml, 1, "color_mode", &format!("{:?}", self.color_mode).to_lowercase());

        bindings(&mut xml, "inputs", "input", &self.inputs);
        bindings(&mut xml, "outputs", "output", &self.outputs);

        xml.push_str("  <labels>\n");
        for (i, label) in self.labels.iter().enumerate() {
            let count = self.counts.get(i).copied().unwrap_or(0);
            let mut attrs = format!("count=\"{}\"", count);
            if let Some(support) = self.class_support.get(i) {
                attrs.push_str(&format!(
                    " precision=\"{:.6}\" recall=\"{:.6}\" f1=\"{:.6}\" support=\"{}\"",
                    self.class_precision[i], self.class_recall[i], self.class_f1[i], support
                ));
            }
            xml.push_str(&format!("    <label {}>{}</label>\n", attrs, escape_xml(label)));
        }
        xml.push_str("  </labels>\n");

        xml.push_str("  <prepro>\n");
        element(&mut xml, 2, "name", &self.prepro_name);
        let params: Vec<String> = self.prepro_params.iter().map(|p| p.to_string()).collect();
        element(&mut xml, 2, "params", &params.join(","));
        xml.push_str("  </prepro>\n");

        element(&mut xml, 1, "source_data", &self.source_data);
        element(&mut xml, 1, "data_split", &self.data_split.to_string());
        element(&mut xml, 1, "accuracy", &format!("{:.6}", self.accuracy));
        element(&mut xml, 1, "precision", &format!("{:.6}", self.precision));
        element(&mut xml, 1, "recall", &format!("{:.6}", self.recall));
        element(&mut xml, 1, "f1", &format!("{:.6}", self.f1));
        element(&mut xml, 1, "support", &self.support.to_string());
        element(&mut xml, 1, "training_epochs", &self.training_epochs.to_string());
        element(&mut xml, 1, "training_time", &format!("{:.3}", self.training_time));
        element(
            &mut xml,
            1,
            "inference_time_per_image",
            &format!("{:.6}", self.inference_time_per_image),
        );

        xml.push_str("</network>\n");
        xml
    }

    /// Write `network_info.xml` into `dir`, creating it if needed
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(NETWORK_INFO_FILE);
        fs::write(&path, self.to_xml())?;
        Ok(path)
    }
}

fn element(xml: &mut String, depth: usize, tag: &str, value: &str) {
    xml.push_str(&format!(
        "{}<{tag}>{}</{tag}>\n",
        "  ".repeat(depth),
        escape_xml(value),
        tag = tag
    ));
}

fn bindings(xml: &mut String, group: &str, tag: &str, items: &[TensorBinding]) {
    xml.push_str(&format!("  <{}>\n", group));
    for item in items {
        let shape: Vec<String> = item.shape.iter().map(|d| d.to_string()).collect();
        xml.push_str(&format!(
            "    <{tag} name=\"{}\" shape=\"{}\"/>\n",
            escape_xml(&item.name),
            shape.join(","),
            tag = tag
        ));
    }
    xml.push_str(&format!("  </{}>\n", group));
}
