// Linear support vector machine, one-vs-rest, trained with the Pegasos
// stochastic sub-gradient method on the hinge loss
//
//   λ/2 ‖w‖² + mean max(0, 1 - y·w·x̃),   λ = 1 / (C·n)
//
// where x̃ is x with a constant 1 appended for the bias. Class
// probabilities are the softmax of the per-class decision values;
// they rank correctly but are not calibrated.
//
// Reference: Shalev-Shwartz et al. (2011) Pegasos: Primal Estimated
//            sub-GrAdient SOlver for SVM

use ndarray::{s, Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{check_features, check_training_data, softmax_in_place, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
pub struct LinearSvm {
    c:       f64,
    epochs:  usize,
    seed:    u64,
    /// (features + 1) × classes, last row is the bias
    weights: Option<Array2<f64>>,
}

impl LinearSvm {
    pub fn new(c: f64, epochs: usize, seed: u64) -> Self {
        Self { c, epochs, seed, weights: None }
    }

    /// Raw one-vs-rest margins, (samples, classes)
    pub fn decision_function(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.weights.as_ref().map(|w| w.nrows() - 1))?;
        let Some(w) = &self.weights else {
            return Ok(Array2::zeros((0, 0)));
        };
        let d = x.ncols();
        Ok(x.dot(&w.slice(s![..d, ..])) + &w.row(d))
    }
}

impl ClassicalClassifier for LinearSvm {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let (n, d) = x.dim();
        let lambda = 1.0 / (self.c * n as f64);
        let radius = 1.0 / lambda.sqrt();

        let mut weights = Array2::<f64>::zeros((d + 1, n_classes));
        for k in 0..n_classes {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(k as u64));
            let mut w = Array1::<f64>::zeros(d + 1);
            let mut order: Vec<usize> = (0..n).collect();
            let mut t = 0usize;

            for _ in 0..self.epochs {
                order.shuffle(&mut rng);
                for &i in &order {
                    t += 1;
                    let eta = 1.0 / (lambda * t as f64);
                    let target = if y[i] == k { 1.0 } else { -1.0 };
                    let row = x.row(i);
                    let margin = target * (row.dot(&w.slice(s![..d])) + w[d]);

                    w *= 1.0 - eta * lambda;
                    if margin < 1.0 {
                        w.slice_mut(s![..d]).scaled_add(eta * target, &row);
                        w[d] += eta * target;
                    }
                    let norm = w.dot(&w).sqrt();
                    if norm > radius {
                        w *= radius / norm;
                    }
                }
            }
            weights.column_mut(k).assign(&w);
        }

        self.weights = Some(weights);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        softmax_in_place(&mut scores);
        Ok(scores)
    }
}
