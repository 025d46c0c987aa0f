// Gaussian naive Bayes: per-class feature means and variances plus a
// class prior. `var_smoothing` adds that fraction of the largest feature
// variance to every variance for stability.

use ndarray::{Array1, Array2, Axis};

use super::{check_features, check_training_data, softmax_in_place, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
struct ClassStats {
    log_prior: f64,
    mean:      Array1<f64>,
    var:       Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct GaussianNb {
    var_smoothing: f64,
    classes:       Vec<Option<ClassStats>>,
    n_features:    Option<usize>,
}

impl GaussianNb {
    pub fn new(var_smoothing: f64) -> Self {
        Self { var_smoothing, classes: Vec::new(), n_features: None }
    }
}

impl ClassicalClassifier for GaussianNb {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let n = x.nrows() as f64;
        let epsilon = self.var_smoothing * x.var_axis(Axis(0), 0.0).fold(0.0f64, |a, &b| a.max(b)) + 1e-12;

        self.classes = (0..n_classes)
            .map(|c| {
                let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == c).collect();
                if rows.is_empty() {
                    return None;
                }
                let xc = x.select(Axis(0), &rows);
                let mean = xc.mean_axis(Axis(0))?;
                let var = xc.var_axis(Axis(0), 0.0) + epsilon;
                Some(ClassStats { log_prior: (rows.len() as f64 / n).ln(), mean, var })
            })
            .collect();
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.n_features)?;
        let mut scores = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (c, stats) in self.classes.iter().enumerate() {
            for (i, row) in x.rows().into_iter().enumerate() {
                scores[[i, c]] = match stats {
                    // a class absent from training can never be predicted
                    None => f64::NEG_INFINITY,
                    Some(s) => {
                        let log_lik: f64 = row
                            .iter()
                            .zip(s.mean.iter().zip(s.var.iter()))
                            .map(|(&v, (&m, &var))| {
                                -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (v - m).powi(2) / var)
                            })
                            .sum();
                        s.log_prior + log_lik
                    }
                };
            }
        }
        softmax_in_place(&mut scores);
        Ok(scores)
    }
}
