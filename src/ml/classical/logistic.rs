// Multinomial logistic regression with L2 penalty, fitted by full-batch
// gradient descent on
//
//   mean cross-entropy + ‖W‖² / (2·C·n)
//
// so C plays the same role as an inverse regularisation strength.

use ndarray::{Array1, Array2, Axis};

use super::{check_features, check_training_data, softmax_in_place, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    c:             f64,
    learning_rate: f64,
    epochs:        usize,
    weights:       Option<(Array2<f64>, Array1<f64>)>,
}

impl LogisticRegression {
    pub fn new(c: f64, learning_rate: f64, epochs: usize) -> Self {
        Self { c, learning_rate, epochs, weights: None }
    }

    fn scores(w: &Array2<f64>, b: &Array1<f64>, x: &Array2<f64>) -> Array2<f64> {
        let mut s = x.dot(w) + b;
        softmax_in_place(&mut s);
        s
    }
}

impl ClassicalClassifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let (n, d) = x.dim();
        let lambda = 1.0 / (self.c * n as f64);
        // the penalty term alone diverges once lr·λ reaches 2
        let lr = self.learning_rate.min(0.5 / lambda);

        let mut targets = Array2::<f64>::zeros((n, n_classes));
        for (i, &label) in y.iter().enumerate() {
            targets[[i, label]] = 1.0;
        }

        let mut w = Array2::<f64>::zeros((d, n_classes));
        let mut b = Array1::<f64>::zeros(n_classes);
        for _ in 0..self.epochs {
            let residual = (Self::scores(&w, &b, x) - &targets) / n as f64;
            let grad_w = x.t().dot(&residual) + &(&w * lambda);
            let grad_b = residual.sum_axis(Axis(0));
            w.scaled_add(-lr, &grad_w);
            b.scaled_add(-lr, &grad_b);
        }

        self.weights = Some((w, b));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.weights.as_ref().map(|(w, _)| w.nrows()))?;
        match &self.weights {
            Some((w, b)) => Ok(Self::scores(w, b, x)),
            None => Ok(Array2::zeros((0, 0))),
        }
    }
}
