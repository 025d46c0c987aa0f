// ============================================================
// Layer 4: Class-Balanced Sampler
// ============================================================
// Draws an epoch's worth of training indices with replacement,
// weighting every sample by 1 / (size of its class):
//
//   CN: 60 samples → weight 1/60 each → class mass 1
//   MCI: 30        → weight 1/30 each → class mass 1
//   AD: 10         → weight 1/10 each → class mass 1
//
// Each class is therefore drawn with probability 1/n_classes,
// so minority classes are oversampled and every epoch sees about
// the same count per class.
//
// Reference: rand crate documentation (WeightedIndex, StdRng)

use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, SeedableRng};

use crate::domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct ClassBalancedSampler {
    /// Dataset indices that may be drawn
    indices: Vec<usize>,
    distribution: WeightedIndex<f64>,
    seed: u64,
}

impl ClassBalancedSampler {
    /// `indices[i]` is a dataset index whose class is `labels[i]`.
    pub fn new(indices: Vec<usize>, labels: &[usize], seed: u64) -> PipelineResult<Self> {
        if indices.is_empty() || indices.len() != labels.len() {
            return Err(PipelineError::Config(format!(
                "sampler needs one label per index (got {} indices, {} labels)",
                indices.len(),
                labels.len()
            )));
        }

        let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut counts = vec![0usize; n_classes];
        for &l in labels {
            counts[l] += 1;
        }

        let weights: Vec<f64> = labels.iter().map(|&l| 1.0 / counts[l] as f64).collect();
        let distribution = WeightedIndex::new(&weights)
            .map_err(|e| PipelineError::Config(format!("invalid sampling weights: {e}")))?;

        tracing::debug!("Balanced sampler over {} samples, class counts {:?}", indices.len(), counts);
        Ok(Self { indices, distribution, seed })
    }

    /// Dataset indices for one epoch. Deterministic in (seed, epoch).
    pub fn epoch_indices(&self, epoch: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        (0..self.indices.len())
            .map(|_| self.indices[self.distribution.sample(&mut rng)])
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequencies_approach_uniform_under_imbalance() {
        // 70 / 20 / 10 split
        let labels: Vec<usize> = (0..100).map(|i| if i < 70 { 0 } else if i < 90 { 1 } else { 2 }).collect();
        let indices: Vec<usize> = (0..100).collect();
        let sampler = ClassBalancedSampler::new(indices, &labels, 3).unwrap();

        let mut counts = [0usize; 3];
        let mut total = 0usize;
        for epoch in 0..300 {
            for idx in sampler.epoch_indices(epoch) {
                counts[labels[idx]] += 1;
                total += 1;
            }
        }
        for c in counts {
            let freq = c as f64 / total as f64;
            assert!((freq - 1.0 / 3.0).abs() < 0.02, "frequency {freq}");
        }
    }

    #[test]
    fn test_draws_only_from_given_indices() {
        let sampler = ClassBalancedSampler::new(vec![10, 20, 30], &[0, 1, 1], 0).unwrap();
        let drawn = sampler.epoch_indices(0);
        assert_eq!(drawn.len(), 3);
        assert!(drawn.iter().all(|i| [10, 20, 30].contains(i)));
    }

    #[test]
    fn test_deterministic_per_epoch() {
        let sampler = ClassBalancedSampler::new((0..20).collect(), &[0; 20], 9).unwrap();
        assert_eq!(sampler.epoch_indices(4), sampler.epoch_indices(4));
        assert_ne!(sampler.epoch_indices(4), sampler.epoch_indices(5));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(ClassBalancedSampler::new(Vec::new(), &[], 0).is_err());
    }
}
