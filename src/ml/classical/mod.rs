// ============================================================
// Layer 5: Classical Classifiers
// ============================================================
// Alternative branch of the pipeline: fixed-length deep features
// (one row per subject) are classified by conventional models.
//
//   FeatureSet ─► StandardScaler ─► ClassicalClassifier
//                                     │
//               grid_search picks hyperparameters by stratified CV
//
// Every model speaks the same two-call contract: `fit` on (x, y),
// then `predict_proba` → (samples, classes) with rows summing to 1.
// `predict` is the row-wise argmax.
//
// Hyperparameters are plain name → number maps so grids can be
// written in the JSON experiment config:
//
//   "random_forest": { "n_estimators": [50, 100], "max_depth": [4, 8] }
//
// Reference: Hastie, Tibshirani & Friedman (2009) Elements of
//            Statistical Learning, ch. 4, 9, 10, 12, 13, 15

use std::{collections::BTreeMap, fmt, str::FromStr};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::ml::evaluator::argmax_rows;

pub mod boosting;
pub mod forest;
pub mod grid_search;
pub mod knn;
pub mod logistic;
pub mod mlp;
pub mod naive_bayes;
pub mod scaler;
pub mod svm;
pub mod tree;

pub use grid_search::{grid_search, GridSearchResult, ParamGrid};
pub use scaler::StandardScaler;

/// One hyperparameter assignment, e.g. {"k": 5.0}
pub type Params = BTreeMap<String, f64>;

pub trait ClassicalClassifier: Send {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()>;

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>>;

    fn predict(&self, x: &Array2<f64>) -> PipelineResult<Vec<usize>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    RandomForest,
    Svm,
    GradientBoosting,
    Knn,
    LogisticRegression,
    NaiveBayes,
    DecisionTree,
    NeuralNetwork,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 8] = [
        ClassifierKind::RandomForest,
        ClassifierKind::Svm,
        ClassifierKind::GradientBoosting,
        ClassifierKind::Knn,
        ClassifierKind::LogisticRegression,
        ClassifierKind::NaiveBayes,
        ClassifierKind::DecisionTree,
        ClassifierKind::NeuralNetwork,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::RandomForest       => "random_forest",
            ClassifierKind::Svm                => "svm",
            ClassifierKind::GradientBoosting   => "gradient_boosting",
            ClassifierKind::Knn                => "knn",
            ClassifierKind::LogisticRegression => "logistic_regression",
            ClassifierKind::NaiveBayes         => "naive_bayes",
            ClassifierKind::DecisionTree       => "decision_tree",
            ClassifierKind::NeuralNetwork      => "neural_network",
        }
    }

    /// Hyperparameter names this kind accepts
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ClassifierKind::RandomForest       => &["n_estimators", "max_depth", "min_samples_split", "max_features"],
            ClassifierKind::Svm                => &["c", "epochs"],
            ClassifierKind::GradientBoosting   => &["n_estimators", "learning_rate", "max_depth"],
            ClassifierKind::Knn                => &["k", "distance_weighted"],
            ClassifierKind::LogisticRegression => &["c", "learning_rate", "epochs"],
            ClassifierKind::NaiveBayes         => &["var_smoothing"],
            ClassifierKind::DecisionTree       => &["max_depth", "min_samples_split"],
            ClassifierKind::NeuralNetwork      => &["hidden", "learning_rate", "epochs", "alpha"],
        }
    }

    /// Search space used when the config does not give one
    pub fn default_grid(&self) -> ParamGrid {
        let grid: &[(&str, &[f64])] = match self {
            ClassifierKind::RandomForest       => &[("n_estimators", &[50.0, 100.0]), ("max_depth", &[4.0, 8.0])],
            ClassifierKind::Svm                => &[("c", &[0.1, 1.0, 10.0])],
            ClassifierKind::GradientBoosting   => &[("n_estimators", &[50.0, 100.0]), ("learning_rate", &[0.05, 0.1])],
            ClassifierKind::Knn                => &[("k", &[3.0, 5.0, 7.0])],
            ClassifierKind::LogisticRegression => &[("c", &[0.1, 1.0, 10.0])],
            ClassifierKind::NaiveBayes         => &[("var_smoothing", &[1e-9, 1e-6])],
            ClassifierKind::DecisionTree       => &[("max_depth", &[3.0, 5.0, 8.0])],
            ClassifierKind::NeuralNetwork      => &[("hidden", &[16.0, 64.0]), ("alpha", &[1e-4, 1e-2])],
        };
        grid.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect()
    }

    /// Instantiate an unfitted model. Unknown parameter names are a
    /// configuration error; missing ones take their defaults.
    pub fn build(&self, params: &Params, seed: u64) -> PipelineResult<Box<dyn ClassicalClassifier>> {
        if let Some(unknown) = params.keys().find(|k| !self.param_names().contains(&k.as_str())) {
            return Err(PipelineError::Config(format!(
                "{} does not accept parameter '{unknown}' (known: {})",
                self.name(),
                self.param_names().join(", ")
            )));
        }
        let p = ParamReader { kind: *self, params };

        Ok(match self {
            ClassifierKind::RandomForest => Box::new(forest::RandomForest::new(
                forest::ForestParams {
                    n_estimators:      p.count("n_estimators", 100)?,
                    max_depth:         p.count("max_depth", 8)?,
                    min_samples_split: p.count("min_samples_split", 2)?,
                    max_features:      p.fraction("max_features", 0.0)?,
                },
                seed,
            )),
            ClassifierKind::Svm => Box::new(svm::LinearSvm::new(p.positive("c", 1.0)?, p.count("epochs", 50)?, seed)),
            ClassifierKind::GradientBoosting => Box::new(boosting::GradientBoosting::new(
                p.count("n_estimators", 50)?,
                p.positive("learning_rate", 0.1)?,
                p.count("max_depth", 3)?,
            )),
            ClassifierKind::Knn => Box::new(knn::Knn::new(p.count("k", 5)?, p.flag("distance_weighted")?)),
            ClassifierKind::LogisticRegression => Box::new(logistic::LogisticRegression::new(
                p.positive("c", 1.0)?,
                p.positive("learning_rate", 0.1)?,
                p.count("epochs", 300)?,
            )),
            ClassifierKind::NaiveBayes => Box::new(naive_bayes::GaussianNb::new(p.non_negative("var_smoothing", 1e-9)?)),
            ClassifierKind::DecisionTree => Box::new(tree::DecisionTree::new(
                p.count("max_depth", 8)?,
                p.count("min_samples_split", 2)?,
            )),
            ClassifierKind::NeuralNetwork => Box::new(mlp::Mlp::new(
                mlp::MlpParams {
                    hidden:        p.count("hidden", 32)?,
                    learning_rate: p.positive("learning_rate", 0.01)?,
                    epochs:        p.count("epochs", 300)?,
                    alpha:         p.non_negative("alpha", 1e-4)?,
                },
                seed,
            )),
        })
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ClassifierKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown classifier '{s}'"))
    }
}

/// Typed access to a `Params` map with defaults and range checks
struct ParamReader<'a> {
    kind:   ClassifierKind,
    params: &'a Params,
}

impl ParamReader<'_> {
    fn raw(&self, name: &str, default: f64) -> PipelineResult<f64> {
        let v = self.params.get(name).copied().unwrap_or(default);
        if v.is_finite() {
            Ok(v)
        } else {
            Err(self.invalid(name, v, "a finite number"))
        }
    }

    fn invalid(&self, name: &str, value: f64, expected: &str) -> PipelineError {
        PipelineError::Config(format!("{}: '{name}' = {value}, expected {expected}", self.kind))
    }

    fn count(&self, name: &str, default: usize) -> PipelineResult<usize> {
        let v = self.raw(name, default as f64)?;
        if v >= 1.0 && v.fract() == 0.0 {
            Ok(v as usize)
        } else {
            Err(self.invalid(name, v, "a positive integer"))
        }
    }

    fn positive(&self, name: &str, default: f64) -> PipelineResult<f64> {
        let v = self.raw(name, default)?;
        if v > 0.0 { Ok(v) } else { Err(self.invalid(name, v, "a positive number")) }
    }

    fn non_negative(&self, name: &str, default: f64) -> PipelineResult<f64> {
        let v = self.raw(name, default)?;
        if v >= 0.0 { Ok(v) } else { Err(self.invalid(name, v, "a non-negative number")) }
    }

    fn fraction(&self, name: &str, default: f64) -> PipelineResult<f64> {
        let v = self.raw(name, default)?;
        if (0.0..=1.0).contains(&v) { Ok(v) } else { Err(self.invalid(name, v, "a value in [0, 1]")) }
    }

    fn flag(&self, name: &str) -> PipelineResult<bool> {
        match self.raw(name, 0.0)? {
            v if v == 0.0 => Ok(false),
            v if v == 1.0 => Ok(true),
            v => Err(self.invalid(name, v, "0 or 1")),
        }
    }
}

/// Shared input check for `fit`
pub(crate) fn check_training_data(x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::Config("cannot fit on an empty feature matrix".into()));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::Config(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if let Some(&bad) = y.iter().find(|&&l| l >= n_classes) {
        return Err(PipelineError::Config(format!("label {bad} outside {n_classes} classes")));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Config("feature matrix contains NaN or infinite values".into()));
    }
    Ok(())
}

/// Shared input check for `predict_proba`
pub(crate) fn check_features(x: &Array2<f64>, expected_cols: Option<usize>) -> PipelineResult<()> {
    match expected_cols {
        None => Err(PipelineError::Config("classifier used before fit".into())),
        Some(cols) if cols != x.ncols() => Err(PipelineError::Config(format!(
            "classifier was fitted on {cols} features, got {}",
            x.ncols()
        ))),
        Some(_) => Ok(()),
    }
}

/// Row-wise softmax of raw scores, in place
pub(crate) fn softmax_in_place(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Three well-separated Gaussian blobs in 4-D
    pub(crate) fn blobs(per_class: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let centres = [[0.0, 0.0, 0.0, 0.0], [4.0, 4.0, 0.0, 0.0], [0.0, 4.0, 4.0, 4.0]];
        let mut rng = StdRng::seed_from_u64(seed);
        let n = per_class * 3;
        let mut x = Array2::zeros((n, 4));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let c = i % 3;
            for j in 0..4 {
                x[[i, j]] = centres[c][j] + rng.gen_range(-1.0..1.0);
            }
            y.push(c);
        }
        (x, y)
    }

    pub(crate) fn accuracy(pred: &[usize], y: &[usize]) -> f64 {
        pred.iter().zip(y).filter(|(a, b)| a == b).count() as f64 / y.len() as f64
    }

    /// Fit on one draw, score on another, check probabilities are valid
    pub(crate) fn assert_learns_blobs(model: &mut dyn ClassicalClassifier, min_accuracy: f64) {
        let (x, y) = blobs(30, 1);
        model.fit(&x, &y, 3).unwrap();

        let (x_test, y_test) = blobs(20, 2);
        let proba = model.predict_proba(&x_test).unwrap();
        assert_eq!(proba.dim(), (60, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6, "row sums to {}", row.sum());
            assert!(row.iter().all(|p| (0.0..=1.0 + 1e-9).contains(p)));
        }
        let acc = accuracy(&model.predict(&x_test).unwrap(), &y_test);
        assert!(acc >= min_accuracy, "accuracy {acc}");
    }

    #[test]
    fn test_every_kind_builds_with_defaults_and_learns() {
        for kind in ClassifierKind::ALL {
            let mut model = kind.build(&Params::new(), 7).unwrap();
            assert_learns_blobs(model.as_mut(), 0.9);
        }
    }

    #[test]
    fn test_unknown_and_invalid_params_rejected() {
        let bad_name: Params = [("depth".to_string(), 3.0)].into_iter().collect();
        assert!(ClassifierKind::DecisionTree.build(&bad_name, 0).is_err());

        let bad_value: Params = [("k".to_string(), 2.5)].into_iter().collect();
        assert!(ClassifierKind::Knn.build(&bad_value, 0).is_err());
    }

    #[test]
    fn test_default_grids_only_use_known_names() {
        for kind in ClassifierKind::ALL {
            for name in kind.default_grid().keys() {
                assert!(kind.param_names().contains(&name.as_str()), "{kind}: {name}");
            }
        }
    }

    #[test]
    fn test_kind_names_parse_and_serialize() {
        for kind in ClassifierKind::ALL {
            assert_eq!(kind.name().parse::<ClassifierKind>().unwrap(), kind);
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind.name()));
        }
        assert_eq!("Random-Forest".parse::<ClassifierKind>().unwrap(), ClassifierKind::RandomForest);
    }

    #[test]
    fn test_predict_before_fit_is_an_error() {
        let model = ClassifierKind::Knn.build(&Params::new(), 0).unwrap();
        assert!(model.predict_proba(&Array2::zeros((1, 4))).is_err());
    }
}
