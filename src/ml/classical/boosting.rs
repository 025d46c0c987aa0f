// ============================================================
// Gradient boosting with the multinomial (softmax) loss
// ============================================================
//   F_k(x) ← log prior of class k
//   repeat n_estimators times:
//     p = softmax(F)
//     for each class k:
//       r_k = 1[y = k] - p_k          (negative gradient)
//       h_k = regression tree fit to r_k
//       F_k += learning_rate · h_k
//
// Reference: Friedman (2001) Greedy Function Approximation

use ndarray::{Array1, Array2};

use super::{check_features, check_training_data, softmax_in_place, tree::RegressionTree, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_estimators:  usize,
    learning_rate: f64,
    max_depth:     usize,
    init:          Option<Array1<f64>>,
    /// stages[m][k] is the tree for class k in round m
    stages:        Vec<Vec<RegressionTree>>,
    n_features:    Option<usize>,
}

impl GradientBoosting {
    pub fn new(n_estimators: usize, learning_rate: f64, max_depth: usize) -> Self {
        Self { n_estimators, learning_rate, max_depth, init: None, stages: Vec::new(), n_features: None }
    }

    fn raw_scores(&self, init: &Array1<f64>, x: &Array2<f64>) -> Array2<f64> {
        let mut f = Array2::from_shape_fn((x.nrows(), init.len()), |(_, k)| init[k]);
        for stage in &self.stages {
            for (k, tree) in stage.iter().enumerate() {
                for (i, row) in x.rows().into_iter().enumerate() {
                    f[[i, k]] += self.learning_rate * tree.predict_row(row);
                }
            }
        }
        f
    }
}

impl ClassicalClassifier for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let n = y.len();

        let mut counts = vec![0.0f64; n_classes];
        for &label in y {
            counts[label] += 1.0;
        }
        // absent classes start far below the others instead of at ln(0)
        let init = Array1::from_iter(counts.iter().map(|&c| ((c + 1e-3) / n as f64).ln()));

        self.stages.clear();
        let mut f = Array2::from_shape_fn((n, n_classes), |(_, k)| init[k]);
        for _ in 0..self.n_estimators {
            let mut p = f.clone();
            softmax_in_place(&mut p);

            let mut stage = Vec::with_capacity(n_classes);
            for k in 0..n_classes {
                let residual: Vec<f64> = (0..n)
                    .map(|i| (if y[i] == k { 1.0 } else { 0.0 }) - p[[i, k]])
                    .collect();
                let tree = RegressionTree::fit(x, &residual, self.max_depth);
                for (i, row) in x.rows().into_iter().enumerate() {
                    f[[i, k]] += self.learning_rate * tree.predict_row(row);
                }
                stage.push(tree);
            }
            self.stages.push(stage);
        }

        self.init = Some(init);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.n_features)?;
        let Some(init) = &self.init else {
            return Ok(Array2::zeros((0, 0)));
        };
        let mut scores = self.raw_scores(init, x);
        softmax_in_place(&mut scores);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classical::tests::{accuracy, assert_learns_blobs};
    use ndarray::array;

    #[test]
    fn test_learns_blobs() {
        assert_learns_blobs(&mut GradientBoosting::new(30, 0.1, 3), 0.9);
    }

    #[test]
    fn test_more_rounds_fit_training_data_tighter() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = [0, 0, 1, 1, 2, 2];
        let mut few = GradientBoosting::new(2, 0.1, 2);
        let mut many = GradientBoosting::new(50, 0.1, 2);
        few.fit(&x, &y, 3).unwrap();
        many.fit(&x, &y, 3).unwrap();

        let p_few = few.predict_proba(&x).unwrap();
        let p_many = many.predict_proba(&x).unwrap();
        assert!(p_many[[0, 0]] > p_few[[0, 0]]);
        assert_eq!(accuracy(&many.predict(&x).unwrap(), &y), 1.0);
    }
}
