//! Mislabel report
//!
//! Looks for images whose nearest neighbours in embedding space mostly carry
//! a different label. Such images are often mislabelled, or sit on a class
//! boundary worth a second look.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{Result, TrainerError};

/// Neighbours consulted per image
pub const NEIGHBOURS: usize = 11;

pub const MISLABEL_FILE: &str = "mislabeled.csv";

/// An image whose neighbourhood disagrees with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MislabelCandidate {
    pub index: usize,
    pub label: usize,
    /// Majority label of the neighbours
    pub suggested: usize,
    /// Fraction of neighbours sharing the image's own label
    pub agreement: f64,
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Labels of the `k` nearest other vectors, closest first
fn neighbour_labels(query: usize, vectors: &[Vec<f32>], labels: &[usize], k: usize) -> Vec<usize> {
    let mut distances: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != query)
        .map(|(i, v)| (squared_distance(&vectors[query], v), i))
        .collect();

    let k = k.min(distances.len());
    if k == 0 {
        return Vec::new();
    }
    distances.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
    distances.truncate(k);
    distances.sort_by(|a, b| a.0.total_cmp(&b.0));
    distances.into_iter().map(|(_, i)| labels[i]).collect()
}

/// Most frequent label; ties go to the label seen first (the closest)
fn majority(neighbours: &[usize], num_classes: usize) -> usize {
    let mut votes = vec![0usize; num_classes];
    for &label in neighbours {
        votes[label] += 1;
    }
    let best = votes.iter().copied().max().unwrap_or(0);
    neighbours
        .iter()
        .copied()
        .find(|&label| votes[label] == best)
        .unwrap_or(0)
}

/// Candidates whose `k`-neighbour majority differs from their own label,
/// sorted by ascending agreement
pub fn find_mislabeled(
    vectors: &[Vec<f32>],
    labels: &[usize],
    num_classes: usize,
    k: usize,
) -> Result<Vec<MislabelCandidate>> {
    if vectors.len() != labels.len() {
        return Err(TrainerError::Dataset(format!(
            "{} vectors but {} labels",
            vectors.len(),
            labels.len()
        )));
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(TrainerError::Dataset(format!(
            "label {} out of range for {} classes",
            label, num_classes
        )));
    }

    let mut candidates: Vec<MislabelCandidate> = (0..vectors.len())
        .into_par_iter()
        .filter_map(|i| {
            let neighbours = neighbour_labels(i, vectors, labels, k);
            if neighbours.is_empty() {
                return None;
            }
            let suggested = majority(&neighbours, num_classes);
            if suggested == labels[i] {
                return None;
            }
            let agree = neighbours.iter().filter(|&&l| l == labels[i]).count();
            Some(MislabelCandidate {
                index: i,
                label: labels[i],
                suggested,
                agreement: agree as f64 / neighbours.len() as f64,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.agreement.total_cmp(&b.agreement).then(a.index.cmp(&b.index)));
    Ok(candidates)
}

/// Write candidates as `filename,label,suggested,agreement`
pub fn write_mislabel_report(
    path: &Path,
    candidates: &[MislabelCandidate],
    filenames: &[String],
    class_names: &[String],
) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["filename", "label", "suggested", "agreement"])?;
    for c in candidates {
        let agreement = format!("{:.3}", c.agreement);
        w.write_record([
            filenames[c.index].as_str(),
            class_names[c.label].as_str(),
            class_names[c.suggested].as_str(),
            agreement.as_str(),
        ])?;
    }
    w.flush()?;
    info!("Wrote {} mislabel candidates to {:?}", candidates.len(), path);
    Ok(())
}
