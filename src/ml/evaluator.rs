// ============================================================
// Layer 5: Evaluator
// ============================================================
// Turns model outputs on a held-out subset into classification
// metrics. The model is only asked for `predict`, so evaluation
// never changes parameters and never augments.
//
//   logits ─► softmax ─► probabilities ─┬─► argmax ─► predictions
//                                       │
//   accuracy, precision / recall / F1 per class, macro averages,
//   cross-entropy, one-vs-rest AUC, confusion matrix
//
// Conventions:
//   - confusion[t][p] counts samples of true class t predicted as p
//   - any 0/0 ratio is reported as 0
//   - AUC is undefined for a class without both positives and
//     negatives; such classes are left out of the macro AUC
//
// Reference: Hanley & McNeil (1982) The Meaning and Use of the AUC

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{LoadRequest, VolumeDataset};
use crate::domain::{
    batch::VolumeBatch,
    error::{PipelineError, PipelineResult},
    sample::ClassSet,
    traits::VolumeClassifier,
};

const PROB_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
    /// None when the class had no positives or no negatives
    pub auc:       Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy:        f64,
    /// Mean cross-entropy of the true class
    pub loss:            f64,
    pub per_class:       Vec<ClassMetrics>,
    pub macro_precision: f64,
    pub macro_recall:    f64,
    pub macro_f1:        f64,
    pub macro_auc:       Option<f64>,
    pub confusion:       Vec<Vec<usize>>,
}

impl ClassificationReport {
    /// `probabilities` is (samples, classes) with rows summing to 1.
    pub fn from_probabilities(y_true: &[usize], probabilities: &Array2<f64>) -> PipelineResult<Self> {
        let (n, n_classes) = probabilities.dim();
        if n == 0 || n != y_true.len() {
            return Err(PipelineError::Config(format!(
                "cannot score {} labels against {} probability rows",
                y_true.len(),
                n
            )));
        }
        if let Some(&bad) = y_true.iter().find(|&&y| y >= n_classes) {
            return Err(PipelineError::Config(format!("label {bad} outside {n_classes} classes")));
        }

        let predictions = argmax_rows(probabilities);

        let mut confusion = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in y_true.iter().zip(&predictions) {
            confusion[t][p] += 1;
        }

        let correct: usize = (0..n_classes).map(|c| confusion[c][c]).sum();
        let accuracy = correct as f64 / n as f64;

        let loss = y_true
            .iter()
            .enumerate()
            .map(|(i, &t)| -probabilities[[i, t]].max(PROB_FLOOR).ln())
            .sum::<f64>()
            / n as f64;

        let per_class: Vec<ClassMetrics> = (0..n_classes)
            .map(|c| {
                let tp = confusion[c][c] as f64;
                let predicted: usize = (0..n_classes).map(|t| confusion[t][c]).sum();
                let support: usize = confusion[c].iter().sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                let f1 = ratio(2.0 * precision * recall, precision + recall);

                let scores: Vec<f64> = probabilities.column(c).to_vec();
                let positive: Vec<bool> = y_true.iter().map(|&t| t == c).collect();
                let auc = one_vs_rest_auc(&scores, &positive);

                ClassMetrics { precision, recall, f1, support, auc }
            })
            .collect();

        let mean = |f: fn(&ClassMetrics) -> f64| per_class.iter().map(f).sum::<f64>() / n_classes as f64;
        let aucs: Vec<f64> = per_class.iter().filter_map(|m| m.auc).collect();
        let macro_auc = (!aucs.is_empty()).then(|| aucs.iter().sum::<f64>() / aucs.len() as f64);

        Ok(Self {
            accuracy,
            loss,
            macro_precision: mean(|m| m.precision),
            macro_recall: mean(|m| m.recall),
            macro_f1: mean(|m| m.f1),
            macro_auc,
            per_class,
            confusion,
        })
    }

    pub fn from_logits(y_true: &[usize], logits: &Array2<f32>) -> PipelineResult<Self> {
        Self::from_probabilities(y_true, &softmax_rows(logits))
    }

    /// Plain-text table for console output
    pub fn to_table(&self, classes: &ClassSet) -> String {
        let mut out = format!(
            "accuracy={:.4}  loss={:.4}  macro_f1={:.4}  macro_auc={}\n",
            self.accuracy,
            self.loss,
            self.macro_f1,
            self.macro_auc.map_or("n/a".to_string(), |a| format!("{a:.4}")),
        );
        out.push_str(&format!("{:<8} {:>9} {:>9} {:>9} {:>8} {:>7}\n", "class", "precision", "recall", "f1", "support", "auc"));
        for (c, m) in self.per_class.iter().enumerate() {
            let name = classes.name(c).unwrap_or("?");
            let auc = m.auc.map_or("n/a".to_string(), |a| format!("{a:.3}"));
            out.push_str(&format!(
                "{:<8} {:>9.3} {:>9.3} {:>9.3} {:>8} {:>7}\n",
                name, m.precision, m.recall, m.f1, m.support, auc
            ));
        }
        out.push_str("confusion (rows = true, cols = predicted):\n");
        for row in &self.confusion {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>5}")).collect();
            out.push_str(&cells.join(""));
            out.push('\n');
        }
        out
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Index of the largest value per row; the first one wins ties.
pub fn argmax_rows(values: &Array2<f64>) -> Vec<usize> {
    values
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

/// Numerically stable row-wise softmax
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f64> {
    let mut probs = logits.mapv(f64::from);
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

/// Mann-Whitney estimate of the one-vs-rest AUC, tied scores share
/// their average rank.
pub fn one_vs_rest_auc(scores: &[f64], positive: &[bool]) -> Option<f64> {
    let n = scores.len();
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = (0..n).filter(|&k| positive[k]).map(|k| ranks[k]).sum();
    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Everything produced by one evaluation pass
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub ids:           Vec<String>,
    pub labels:        Vec<usize>,
    pub predictions:   Vec<usize>,
    pub probabilities: Array2<f64>,
    pub metrics:       ClassificationReport,
}

/// Runs `predict` over a subset of a dataset in fixed-size batches
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    batch_size: usize,
}

impl Evaluator {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    pub fn evaluate(
        &self,
        model:   &dyn VolumeClassifier,
        dataset: &VolumeDataset,
        indices: &[usize],
    ) -> PipelineResult<EvaluationReport> {
        let n_classes = model.num_classes();
        let mut ids = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        let mut rows: Vec<f32> = Vec::with_capacity(indices.len() * n_classes);

        for chunk in indices.chunks(self.batch_size) {
            let requests: Vec<LoadRequest> = chunk.iter().map(|&i| (i, None)).collect();
            let samples = dataset.load_many(&requests)?;
            if samples.is_empty() {
                continue;
            }
            let batch = VolumeBatch::from_samples(samples)?;
            let logits = model.predict(&batch)?;
            if logits.dim() != (batch.len(), n_classes) {
                return Err(PipelineError::Tensor(format!(
                    "{} returned logits of shape {:?}, expected ({}, {})",
                    model.architecture(),
                    logits.dim(),
                    batch.len(),
                    n_classes
                )));
            }
            rows.extend(logits.iter());
            ids.extend(batch.ids);
            labels.extend(batch.labels);
        }

        if labels.is_empty() {
            return Err(PipelineError::Config("no samples could be evaluated".into()));
        }

        let logits = Array2::from_shape_vec((labels.len(), n_classes), rows)
            .map_err(|e| PipelineError::Tensor(e.to_string()))?;
        let probabilities = softmax_rows(&logits);
        let predictions = argmax_rows(&probabilities);
        let metrics = ClassificationReport::from_probabilities(&labels, &probabilities)?;

        tracing::debug!(
            "Evaluated {} samples: accuracy={:.4}, loss={:.4}",
            labels.len(), metrics.accuracy, metrics.loss
        );
        Ok(EvaluationReport { ids, labels, predictions, probabilities, metrics })
    }
}
