// ============================================================
// Hyperparameter grid search with stratified cross-validation
// ============================================================
//   for every candidate in the cartesian product of the grid:
//     for every stratified fold:
//       StandardScaler.fit(train rows)   ← validation rows never seen
//       model.fit(scaled train) → accuracy on scaled validation
//     score = mean fold accuracy
//   best = highest score (the earlier candidate wins ties)
//   refit scaler + best model on all rows
//
// Candidates are scored in parallel with rayon.

use std::collections::BTreeMap;

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ClassicalClassifier, ClassifierKind, Params, StandardScaler};
use crate::data::splitter::stratified_k_fold;
use crate::domain::error::{PipelineError, PipelineResult};

/// Parameter name → values to try
pub type ParamGrid = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params:          Params,
    pub mean_accuracy:   f64,
    pub fold_accuracies: Vec<f64>,
}

pub struct GridSearchResult {
    pub kind:        ClassifierKind,
    pub best_params: Params,
    pub best_score:  f64,
    pub candidates:  Vec<CandidateScore>,
    scaler:          StandardScaler,
    model:           Box<dyn ClassicalClassifier>,
}

impl GridSearchResult {
    /// Probabilities from the refitted best model (input is scaled first)
    pub fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        self.model.predict_proba(&self.scaler.transform(x)?)
    }
}

/// Cartesian product of the grid, keys in sorted order. An empty grid
/// yields a single candidate with all defaults.
pub fn expand_grid(grid: &ParamGrid) -> PipelineResult<Vec<Params>> {
    let mut candidates = vec![Params::new()];
    for (name, values) in grid {
        if values.is_empty() {
            return Err(PipelineError::Config(format!("grid entry '{name}' has no values")));
        }
        candidates = candidates
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |&v| {
                    let mut p = base.clone();
                    p.insert(name.clone(), v);
                    p
                })
            })
            .collect();
    }
    Ok(candidates)
}

pub fn grid_search(
    kind:      ClassifierKind,
    grid:      &ParamGrid,
    x:         &Array2<f64>,
    y:         &[usize],
    n_classes: usize,
    cv_folds:  usize,
    seed:      u64,
) -> PipelineResult<GridSearchResult> {
    let candidates = expand_grid(grid)?;
    let folds = stratified_k_fold(y, cv_folds, seed)?;
    // validate every candidate before spending time on CV
    for params in &candidates {
        kind.build(params, seed)?;
    }

    let scores: Vec<CandidateScore> = candidates
        .into_par_iter()
        .map(|params| -> PipelineResult<CandidateScore> {
            let fold_accuracies = folds
                .iter()
                .map(|fold| -> PipelineResult<f64> {
                    let x_train = x.select(Axis(0), &fold.train);
                    let y_train: Vec<usize> = fold.train.iter().map(|&i| y[i]).collect();
                    let x_val = x.select(Axis(0), &fold.validation);

                    let mut scaler = StandardScaler::new();
                    let x_train = scaler.fit_transform(&x_train)?;
                    let x_val = scaler.transform(&x_val)?;

                    let mut model = kind.build(&params, seed)?;
                    model.fit(&x_train, &y_train, n_classes)?;
                    let pred = model.predict(&x_val)?;
                    let correct = pred.iter().zip(&fold.validation).filter(|&(p, i)| *p == y[*i]).count();
                    Ok(correct as f64 / fold.validation.len().max(1) as f64)
                })
                .collect::<PipelineResult<Vec<f64>>>()?;
            let mean_accuracy = fold_accuracies.iter().sum::<f64>() / fold_accuracies.len() as f64;
            Ok(CandidateScore { params, mean_accuracy, fold_accuracies })
        })
        .collect::<PipelineResult<Vec<CandidateScore>>>()?;

    let best = scores
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (i, s)| match best {
            Some((_, score)) if s.mean_accuracy <= score => best,
            _ => Some((i, s.mean_accuracy)),
        })
        .map(|(i, _)| i)
        .ok_or_else(|| PipelineError::Config(format!("{kind}: empty parameter grid")))?;
    let best_params = scores[best].params.clone();
    let best_score = scores[best].mean_accuracy;

    let mut scaler = StandardScaler::new();
    let x_all = scaler.fit_transform(x)?;
    let mut model = kind.build(&best_params, seed)?;
    model.fit(&x_all, y, n_classes)?;

    tracing::info!(
        "{}: best CV accuracy {:.4} with {:?} ({} candidates, {} folds)",
        kind, best_score, best_params, scores.len(), folds.len()
    );
    Ok(GridSearchResult { kind, best_params, best_score, candidates: scores, scaler, model })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classical::tests::{accuracy, blobs};

    fn grid(entries: &[(&str, &[f64])]) -> ParamGrid {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect()
    }

    #[test]
    fn test_expand_grid_is_cartesian() {
        let g = grid(&[("a", &[1.0, 2.0]), ("b", &[10.0, 20.0, 30.0])]);
        let c = expand_grid(&g).unwrap();
        assert_eq!(c.len(), 6);
        assert_eq!(c[0]["a"], 1.0);
        assert_eq!(c[0]["b"], 10.0);
        assert_eq!(c[1]["b"], 20.0);
        assert_eq!(c[5]["a"], 2.0);

        assert_eq!(expand_grid(&ParamGrid::new()).unwrap(), vec![Params::new()]);
        assert!(expand_grid(&grid(&[("a", &[])])).is_err());
    }

    #[test]
    fn test_search_knn_on_blobs() {
        let (x, y) = blobs(15, 3);
        let result = grid_search(ClassifierKind::Knn, &grid(&[("k", &[1.0, 3.0, 5.0])]), &x, &y, 3, 3, 0).unwrap();
        assert_eq!(result.candidates.len(), 3);
        assert!(result.best_score >= 0.9);
        assert!(result.candidates.iter().all(|c| c.fold_accuracies.len() == 3));

        let (x_test, y_test) = blobs(10, 8);
        let proba = result.predict_proba(&x_test).unwrap();
        assert_eq!(proba.dim(), (30, 3));
        let predicted: Vec<usize> = proba
            .rows()
            .into_iter()
            .map(|row| (0..3).fold(0, |best, c| if row[c] > row[best] { c } else { best }))
            .collect();
        assert!(accuracy(&predicted, &y_test) >= 0.9);
    }

    #[test]
    fn test_first_candidate_wins_ties() {
        let (x, y) = blobs(10, 5);
        // the blobs need only a few splits, so both depths grow the same tree
        let result = grid_search(
            ClassifierKind::DecisionTree,
            &grid(&[("max_depth", &[4.0, 6.0])]),
            &x, &y, 3, 2, 1,
        )
        .unwrap();
        assert_eq!(result.candidates[0].mean_accuracy, result.candidates[1].mean_accuracy);
        assert_eq!(result.best_params["max_depth"], 4.0);
    }

    #[test]
    fn test_invalid_candidate_fails_fast() {
        let (x, y) = blobs(5, 0);
        let err = grid_search(ClassifierKind::Knn, &grid(&[("k", &[0.0])]), &x, &y, 3, 2, 0);
        assert!(matches!(err, Err(PipelineError::Config(_))));
    }
}
