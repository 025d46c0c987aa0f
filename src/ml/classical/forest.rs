// Random forest: bootstrap-sampled CART trees, each examining a random
// feature subset at every split. Probabilities are the mean of the
// trees' leaf distributions. Trees are fitted in parallel with rayon;
// tree i uses seed + i, so results do not depend on thread scheduling.

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use super::{check_features, check_training_data, tree::DecisionTree, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_estimators:      usize,
    pub max_depth:         usize,
    pub min_samples_split: usize,
    /// Fraction of features per split; 0 means √d
    pub max_features:      f64,
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    params:     ForestParams,
    seed:       u64,
    trees:      Vec<DecisionTree>,
    n_features: Option<usize>,
    n_classes:  usize,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self { params, seed, trees: Vec::new(), n_features: None, n_classes: 0 }
    }

    fn features_per_split(&self, d: usize) -> usize {
        let m = if self.params.max_features > 0.0 {
            (self.params.max_features * d as f64).ceil() as usize
        } else {
            (d as f64).sqrt().round() as usize
        };
        m.clamp(1, d)
    }
}

impl ClassicalClassifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let n = y.len();
        let m = self.features_per_split(x.ncols());
        let p = self.params;
        let seed = self.seed;

        self.trees = (0..p.n_estimators)
            .into_par_iter()
            .map(|i| {
                let tree_seed = seed.wrapping_add(i as u64);
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut tree = DecisionTree::new(p.max_depth, p.min_samples_split).with_feature_sampling(m, tree_seed);
                tree.fit_rows(x, y, n_classes, rows);
                tree
            })
            .collect();

        self.n_features = Some(x.ncols());
        self.n_classes = n_classes;
        tracing::debug!("Random forest: {} trees, {} features per split", self.trees.len(), m);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.n_features)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            proba += &tree.predict_proba(x)?;
        }
        proba /= self.trees.len().max(1) as f64;
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classical::tests::{assert_learns_blobs, blobs};

    fn params(n_estimators: usize) -> ForestParams {
        ForestParams { n_estimators, max_depth: 6, min_samples_split: 2, max_features: 0.0 }
    }

    #[test]
    fn test_learns_blobs() {
        assert_learns_blobs(&mut RandomForest::new(params(30), 3), 0.95);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = blobs(10, 4);
        let mut a = RandomForest::new(params(10), 11);
        let mut b = RandomForest::new(params(10), 11);
        a.fit(&x, &y, 3).unwrap();
        b.fit(&x, &y, 3).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_features_per_split() {
        let forest = RandomForest::new(params(1), 0);
        assert_eq!(forest.features_per_split(16), 4);
        assert_eq!(forest.features_per_split(1), 1);
        let half = RandomForest::new(ForestParams { max_features: 0.5, ..params(1) }, 0);
        assert_eq!(half.features_per_split(9), 5);
    }
}
