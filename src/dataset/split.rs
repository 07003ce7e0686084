//! Stratified train/test split
//!
//! Each class is shuffled with the run seed and a contiguous window of
//! `round(count * fraction)` items is held out for testing. The window
//! starts at `offset * window` (wrapping), so successive offsets select
//! disjoint folds while the seed stays fixed.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TrainerError};

/// Train and test indices into a data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl DatasetSplit {
    /// Every index in the training partition, nothing held out
    pub fn train_only(len: usize) -> Self {
        Self {
            train: (0..len).collect(),
            test: Vec::new(),
        }
    }
}

/// Split `labels` per class into train and test indices
pub fn stratified_split(
    labels: &[usize],
    fraction: f64,
    offset: usize,
    rng: &mut ChaCha8Rng,
) -> Result<DatasetSplit> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(TrainerError::Config(format!(
            "split fraction must be in [0, 1), got {}",
            fraction
        )));
    }
    if fraction == 0.0 {
        return Ok(DatasetSplit::train_only(labels.len()));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut split = DatasetSplit::default();
    for (_, mut indices) in by_class {
        indices.shuffle(rng);
        let count = indices.len();

        // A class keeps at least one training example
        let n_test = ((count as f64 * fraction).round() as usize).min(count.saturating_sub(1));
        if n_test == 0 {
            split.train.extend(indices);
            continue;
        }

        let start = (offset * n_test) % count;
        for (pos, idx) in indices.into_iter().enumerate() {
            let rel = (pos + count - start) % count;
            if rel < n_test {
                split.test.push(idx);
            } else {
                split.train.push(idx);
            }
        }
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn balanced_labels(per_class: usize, classes: usize) -> Vec<usize> {
        (0..classes).flat_map(|c| std::iter::repeat(c).take(per_class)).collect()
    }

    #[test]
    fn test_split_sizes() {
        let labels = balanced_labels(50, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let split = stratified_split(&labels, 0.2, 0, &mut rng).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_class0 = split.test.iter().filter(|&&i| labels[i] == 0).count();
        assert_eq!(test_class0, 10);
    }

    #[test]
    fn test_split_is_a_partition() {
        let labels = balanced_labels(13, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let split = stratified_split(&labels, 0.3, 1, &mut rng).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let labels = balanced_labels(20, 2);
        let a = stratified_split(&labels, 0.25, 0, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let b = stratified_split(&labels, 0.25, 0, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_offsets_select_disjoint_folds() {
        let labels = balanced_labels(20, 1);
        let fold0 = stratified_split(&labels, 0.25, 0, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let fold1 = stratified_split(&labels, 0.25, 1, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();

        let a: HashSet<_> = fold0.test.iter().collect();
        let b: HashSet<_> = fold1.test.iter().collect();
        assert!(a.is_disjoint(&b));
    }

    #[test]
    fn test_zero_fraction_keeps_everything_for_training() {
        let labels = balanced_labels(5, 2);
        let split = stratified_split(&labels, 0.0, 0, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(split.train.len(), 10);
        assert!(split.test.is_empty());
    }

    #[test]
    fn test_singleton_class_stays_in_training() {
        let labels = vec![0, 0, 0, 0, 1];
        let split = stratified_split(&labels, 0.5, 0, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert!(split.train.contains(&4));
    }

    #[test]
    fn test_invalid_fraction() {
        let result = stratified_split(&[0, 1], 1.5, 0, &mut ChaCha8Rng::seed_from_u64(1));
        assert!(matches!(result, Err(TrainerError::Config(_))));
    }
}
