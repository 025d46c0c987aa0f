// ============================================================
// Layer 4: Stratified K-Fold Splitter
// ============================================================
// Partitions sample indices into k disjoint validation folds so
// that each fold keeps roughly the class proportions of the full
// dataset:
//
//   1. Group indices by label
//   2. Shuffle each group with a seeded RNG (Fisher-Yates)
//   3. Deal the shuffled indices round-robin to folds, carrying
//      the fold cursor across classes so fold sizes differ by at
//      most one
//
// Fold i validates on the indices dealt to i and trains on the
// rest. Every index therefore appears in exactly one validation
// subset, and train/validation are disjoint inside a round.
//
// Reference: rand crate documentation (SliceRandom, StdRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

/// One cross-validation round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSplit {
    /// Zero-based fold number
    pub fold: usize,
    /// Sorted indices used for parameter updates
    pub train: Vec<usize>,
    /// Sorted indices held out for validation / evaluation
    pub validation: Vec<usize>,
}

/// Split `labels.len()` samples into `k` stratified folds.
///
/// # Arguments
/// * `labels` - class label of every sample, by sample index
/// * `k`      - number of folds (at least 2, at most the sample count)
/// * `seed`   - shuffling seed; the same seed gives the same folds
pub fn stratified_k_fold(labels: &[usize], k: usize, seed: u64) -> PipelineResult<Vec<FoldSplit>> {
    if k < 2 {
        return Err(PipelineError::Config(format!("fold count must be at least 2, got {k}")));
    }
    if k > labels.len() {
        return Err(PipelineError::Config(format!(
            "fold count {k} exceeds the number of samples ({})",
            labels.len()
        )));
    }

    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (idx, &label) in labels.iter().enumerate() {
        by_class[label].push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut assignment = vec![Vec::new(); k];
    let mut cursor = 0usize;

    for (label, group) in by_class.iter_mut().enumerate() {
        if !group.is_empty() && group.len() < k {
            tracing::warn!(
                "Class {} has {} samples for {} folds; some folds will not validate on it",
                label,
                group.len(),
                k
            );
        }
        group.shuffle(&mut rng);
        for &idx in group.iter() {
            assignment[cursor].push(idx);
            cursor = (cursor + 1) % k;
        }
    }

    let folds = assignment
        .into_iter()
        .enumerate()
        .map(|(fold, mut validation)| {
            validation.sort_unstable();
            let train = (0..labels.len())
                .filter(|i| validation.binary_search(i).is_err())
                .collect();
            FoldSplit { fold, train, validation }
        })
        .collect::<Vec<_>>();

    for f in &folds {
        tracing::debug!(
            "Fold {}: {} training, {} validation",
            f.fold,
            f.train.len(),
            f.validation.len()
        );
    }

    Ok(folds)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn balanced_labels(per_class: usize, classes: usize) -> Vec<usize> {
        (0..classes).flat_map(|c| std::iter::repeat(c).take(per_class)).collect()
    }

    #[test]
    fn test_five_folds_of_thirty() {
        let labels = balanced_labels(10, 3);
        let folds = stratified_k_fold(&labels, 5, 7).unwrap();
        assert_eq!(folds.len(), 5);
        for f in &folds {
            assert_eq!(f.validation.len(), 6);
            assert_eq!(f.train.len(), 24);
            // Two samples of every class in each validation fold
            for class in 0..3 {
                let n = f.validation.iter().filter(|&&i| labels[i] == class).count();
                assert_eq!(n, 2);
            }
        }
    }

    #[test]
    fn test_same_seed_same_folds() {
        let labels = balanced_labels(8, 3);
        assert_eq!(
            stratified_k_fold(&labels, 4, 11).unwrap(),
            stratified_k_fold(&labels, 4, 11).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_fold_counts() {
        let labels = balanced_labels(2, 2);
        assert!(stratified_k_fold(&labels, 1, 0).is_err());
        assert!(stratified_k_fold(&labels, 5, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_validation_subsets_partition_all_samples(
            labels in prop::collection::vec(0usize..3, 6..60),
            k in 2usize..6,
            seed in any::<u64>(),
        ) {
            prop_assume!(k <= labels.len());
            let folds = stratified_k_fold(&labels, k, seed).unwrap();

            let mut seen = vec![0usize; labels.len()];
            for f in &folds {
                for &i in &f.validation {
                    seen[i] += 1;
                    prop_assert!(f.train.binary_search(&i).is_err());
                }
                prop_assert_eq!(f.train.len() + f.validation.len(), labels.len());
            }
            prop_assert!(seen.iter().all(|&c| c == 1));
        }
    }
}
