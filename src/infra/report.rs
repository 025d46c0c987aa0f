// ============================================================
// Layer 6: Cross-Validation Report
// ============================================================
// Collects the final scores of every fold and writes them next to
// the per-epoch metrics:
//
//   {output}/reports/{architecture}/
//     fold_summary.csv   one row per fold
//     summary.txt        mean ± std across folds, pooled confusion
//     report.json        everything above, serde-serialised
//
// The feature branch writes its own table:
//
//   {output}/features/{architecture}/classical_results.csv
//
// Standard deviations are sample deviations (n - 1); a single
// fold reports 0.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineResult;
use crate::domain::sample::ClassSet;
use crate::ml::classical::{ClassifierKind, Params};
use crate::ml::evaluator::ClassificationReport;
use crate::ml::trainer::{TrainOutcome, TrainerState};

/// Final validation scores of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold:            usize,
    pub architecture:    String,
    pub best_epoch:      usize,
    pub epochs_run:      usize,
    pub final_state:     TrainerState,
    pub accuracy:        f64,
    pub loss:            f64,
    pub macro_precision: f64,
    pub macro_recall:    f64,
    pub macro_f1:        f64,
    pub macro_auc:       Option<f64>,
    /// rows = true class, columns = predicted class
    pub confusion:       Vec<Vec<usize>>,
}

impl FoldSummary {
    pub fn new(fold: usize, architecture: &str, outcome: &TrainOutcome, metrics: &ClassificationReport) -> Self {
        Self {
            fold,
            architecture:    architecture.to_string(),
            best_epoch:      outcome.best_epoch,
            epochs_run:      outcome.epochs_run,
            final_state:     outcome.final_state,
            accuracy:        metrics.accuracy,
            loss:            metrics.loss,
            macro_precision: metrics.macro_precision,
            macro_recall:    metrics.macro_recall,
            macro_f1:        metrics.macro_f1,
            macro_auc:       metrics.macro_auc,
            confusion:       metrics.confusion.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std:  f64,
    /// Number of folds that contributed
    pub n:    usize,
}

/// Mean and sample standard deviation; `None` for an empty slice
pub fn mean_std(values: &[f64]) -> Option<MeanStd> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    Some(MeanStd { mean, std, n })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub architecture: String,
    pub classes:      Vec<String>,
    pub folds:        Vec<FoldSummary>,
    /// metric name → mean ± std over folds
    pub aggregate:    BTreeMap<String, MeanStd>,
    /// Sum of the per-fold confusion matrices
    pub confusion:    Vec<Vec<usize>>,
}

impl CrossValidationReport {
    pub fn new(architecture: &str, classes: &ClassSet, folds: Vec<FoldSummary>) -> Self {
        let mut aggregate = BTreeMap::new();
        let columns: [(&str, fn(&FoldSummary) -> Option<f64>); 6] = [
            ("accuracy", |f| Some(f.accuracy)),
            ("loss", |f| Some(f.loss)),
            ("macro_precision", |f| Some(f.macro_precision)),
            ("macro_recall", |f| Some(f.macro_recall)),
            ("macro_f1", |f| Some(f.macro_f1)),
            ("macro_auc", |f| f.macro_auc),
        ];
        for (name, get) in columns {
            let values: Vec<f64> = folds.iter().filter_map(get).collect();
            if let Some(summary) = mean_std(&values) {
                aggregate.insert(name.to_string(), summary);
            }
        }

        let n = classes.len();
        let mut confusion = vec![vec![0usize; n]; n];
        for fold in &folds {
            for (t, row) in fold.confusion.iter().enumerate().take(n) {
                for (p, &count) in row.iter().enumerate().take(n) {
                    confusion[t][p] += count;
                }
            }
        }

        Self {
            architecture: architecture.to_string(),
            classes: classes.names().to_vec(),
            folds,
            aggregate,
            confusion,
        }
    }

    pub fn metric(&self, name: &str) -> Option<MeanStd> {
        self.aggregate.get(name).copied()
    }

    /// Human-readable summary, also written to summary.txt
    pub fn render(&self) -> String {
        let mut out = format!("{} cross-validation ({} folds)\n", self.architecture, self.folds.len());
        for (name, s) in &self.aggregate {
            out.push_str(&format!("  {name:<16} {:.4} ± {:.4}  (n={})\n", s.mean, s.std, s.n));
        }

        out.push_str("\nPooled confusion matrix (rows = true, cols = predicted)\n");
        out.push_str(&format!("{:>8}", ""));
        for name in &self.classes {
            out.push_str(&format!("{name:>8}"));
        }
        out.push('\n');
        for (name, row) in self.classes.iter().zip(&self.confusion) {
            out.push_str(&format!("{name:>8}"));
            for count in row {
                out.push_str(&format!("{count:>8}"));
            }
            out.push('\n');
        }
        out
    }

    /// Write fold_summary.csv, summary.txt and report.json into `dir`
    pub fn write(&self, dir: &Path) -> PipelineResult<()> {
        fs::create_dir_all(dir)?;

        let mut csv = fs::File::create(dir.join("fold_summary.csv"))?;
        writeln!(
            csv,
            "fold,architecture,best_epoch,epochs_run,final_state,accuracy,loss,macro_precision,macro_recall,macro_f1,macro_auc"
        )?;
        for f in &self.folds {
            let state = serde_json::to_value(f.final_state)?;
            writeln!(
                csv,
                "{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
                f.fold,
                f.architecture,
                f.best_epoch,
                f.epochs_run,
                state.as_str().unwrap_or_default(),
                f.accuracy,
                f.loss,
                f.macro_precision,
                f.macro_recall,
                f.macro_f1,
                f.macro_auc.map(|v| format!("{v:.6}")).unwrap_or_default(),
            )?;
        }

        fs::write(dir.join("summary.txt"), self.render())?;
        fs::write(dir.join("report.json"), serde_json::to_string_pretty(self)?)?;

        tracing::info!("Cross-validation report written to '{}'", dir.display());
        Ok(())
    }
}

pub fn report_dir(output_dir: &Path, architecture: &str) -> PathBuf {
    output_dir.join("reports").join(architecture)
}

// ─── Feature branch ───────────────────────────────────────────────────────────
/// Best grid-search candidate of one classifier kind on one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicalResult {
    pub fold:            usize,
    pub kind:            ClassifierKind,
    pub best_params:     Params,
    /// Mean inner-CV accuracy of the chosen parameters
    pub cv_accuracy:     f64,
    pub val_accuracy:    f64,
    pub val_macro_f1:    f64,
}

/// `c=1;epochs=200`, keys in sorted order
pub fn format_params(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn write_classical_results(path: &Path, results: &[ClassicalResult]) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    writeln!(f, "fold,classifier,best_params,cv_accuracy,val_accuracy,val_macro_f1")?;
    for r in results {
        writeln!(
            f,
            "{},{},{},{:.6},{:.6},{:.6}",
            r.fold,
            r.kind,
            format_params(&r.best_params),
            r.cv_accuracy,
            r.val_accuracy,
            r.val_macro_f1,
        )?;
    }
    tracing::info!("Wrote {} classical results to '{}'", results.len(), path.display());
    Ok(())
}
