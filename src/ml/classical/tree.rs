// ============================================================
// CART decision trees
// ============================================================
// Binary axis-aligned splits chosen greedily:
//
//   classification → minimise weighted Gini impurity
//                    leaf = class proportions
//   regression     → minimise weighted variance (squared error)
//                    leaf = mean target
//
// Thresholds sit halfway between consecutive distinct values. A node
// becomes a leaf at max_depth, below min_samples_split, when pure, or
// when no split lowers the impurity.
//
// The same builder serves DecisionTree, the trees of RandomForest
// (feature subsampling via `max_features` + an RNG) and the
// regression trees of GradientBoosting.
//
// Reference: Breiman et al. (1984) Classification and Regression Trees

use ndarray::{Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index::sample, SeedableRng};

use super::{check_features, check_training_data, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(Vec<f64>),
    Split {
        feature:   usize,
        threshold: f64,
        left:      Box<Node>,
        right:     Box<Node>,
    },
}

impl Node {
    pub(crate) fn leaf_for(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(v) => return v,
                Node::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Width of the leaf vectors (classes, or 1 for regression)
    pub(crate) fn output_len(&self) -> usize {
        match self {
            Node::Leaf(v) => v.len(),
            Node::Split { left, .. } => left.output_len(),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

pub(crate) enum Target<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

/// Running sufficient statistics of one side of a split
#[derive(Clone)]
struct Acc {
    counts: Vec<f64>,
    sum:    f64,
    sum_sq: f64,
    n:      f64,
}

impl Acc {
    fn new(n_classes: usize) -> Self {
        Self { counts: vec![0.0; n_classes], sum: 0.0, sum_sq: 0.0, n: 0.0 }
    }
}

pub(crate) struct TreeBuilder<'a> {
    pub x:                 &'a Array2<f64>,
    pub target:            Target<'a>,
    pub max_depth:         usize,
    pub min_samples_split: usize,
    /// Features examined per split; `None` examines all of them
    pub max_features:      Option<usize>,
    pub rng:               StdRng,
}

impl TreeBuilder<'_> {
    fn n_classes(&self) -> usize {
        match self.target {
            Target::Classes { n_classes, .. } => n_classes,
            Target::Values(_) => 0,
        }
    }

    fn push(&self, acc: &mut Acc, row: usize) {
        match self.target {
            Target::Classes { labels, .. } => acc.counts[labels[row]] += 1.0,
            Target::Values(values) => {
                acc.sum += values[row];
                acc.sum_sq += values[row] * values[row];
            }
        }
        acc.n += 1.0;
    }

    fn impurity(&self, acc: &Acc) -> f64 {
        if acc.n == 0.0 {
            return 0.0;
        }
        match self.target {
            Target::Classes { .. } => 1.0 - acc.counts.iter().map(|c| (c / acc.n).powi(2)).sum::<f64>(),
            Target::Values(_) => {
                let mean = acc.sum / acc.n;
                (acc.sum_sq / acc.n - mean * mean).max(0.0)
            }
        }
    }

    fn stats(&self, rows: &[usize]) -> Acc {
        let mut acc = Acc::new(self.n_classes());
        for &r in rows {
            self.push(&mut acc, r);
        }
        acc
    }

    fn leaf(&self, acc: &Acc) -> Node {
        match self.target {
            Target::Classes { .. } => Node::Leaf(acc.counts.iter().map(|c| c / acc.n).collect()),
            Target::Values(_) => Node::Leaf(vec![acc.sum / acc.n]),
        }
    }

    pub(crate) fn build(&mut self, rows: Vec<usize>) -> Node {
        self.grow(rows, 0)
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let total = self.stats(&rows);
        let parent = self.impurity(&total);
        if depth >= self.max_depth || rows.len() < self.min_samples_split.max(2) || parent <= 1e-12 {
            return self.leaf(&total);
        }

        let Some((feature, threshold)) = self.best_split(&rows, &total, parent) else {
            return self.leaf(&total);
        };
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| self.x[[r, feature]] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let d = self.x.ncols();
        match self.max_features {
            Some(m) if m < d => sample(&mut self.rng, d, m.max(1)).into_vec(),
            _ => (0..d).collect(),
        }
    }

    fn best_split(&mut self, rows: &[usize], total: &Acc, parent: f64) -> Option<(usize, f64)> {
        let n = rows.len() as f64;
        let mut best: Option<(f64, usize, f64)> = None;

        for feature in self.candidate_features() {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = Acc::new(self.n_classes());
            for i in 1..sorted.len() {
                self.push(&mut left, sorted[i - 1]);
                let (lo, hi) = (self.x[[sorted[i - 1], feature]], self.x[[sorted[i], feature]]);
                if lo == hi {
                    continue;
                }
                let right = Acc {
                    counts: total.counts.iter().zip(&left.counts).map(|(t, l)| t - l).collect(),
                    sum:    total.sum - left.sum,
                    sum_sq: total.sum_sq - left.sum_sq,
                    n:      total.n - left.n,
                };
                let weighted = (left.n * self.impurity(&left) + right.n * self.impurity(&right)) / n;
                if best.map_or(true, |(score, _, _)| weighted < score) {
                    best = Some((weighted, feature, lo + (hi - lo) / 2.0));
                }
            }
        }

        best.filter(|(score, _, _)| *score < parent - 1e-12)
            .map(|(_, feature, threshold)| (feature, threshold))
    }
}

// ─── Classification tree ──────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DecisionTree {
    max_depth:         usize,
    min_samples_split: usize,
    max_features:      Option<usize>,
    seed:              u64,
    root:              Option<Node>,
    n_features:        Option<usize>,
}

impl DecisionTree {
    pub fn new(max_depth: usize, min_samples_split: usize) -> Self {
        Self { max_depth, min_samples_split, max_features: None, seed: 0, root: None, n_features: None }
    }

    /// Examine only `max_features` random features per split
    pub fn with_feature_sampling(mut self, max_features: usize, seed: u64) -> Self {
        self.max_features = Some(max_features);
        self.seed = seed;
        self
    }

    /// Fit on the given rows only (repeats allowed, e.g. a bootstrap)
    pub(crate) fn fit_rows(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize, rows: Vec<usize>) {
        let mut builder = TreeBuilder {
            x,
            target: Target::Classes { labels: y, n_classes },
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: self.max_features,
            rng: StdRng::seed_from_u64(self.seed),
        };
        self.root = Some(builder.build(rows));
        self.n_features = Some(x.ncols());
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }
}

impl ClassicalClassifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        self.fit_rows(x, y, n_classes, (0..y.len()).collect());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.n_features)?;
        let Some(root) = &self.root else {
            return Ok(Array2::zeros((0, 0)));
        };
        let n_classes = root.output_len();
        let mut proba = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (c, &p) in root.leaf_for(row).iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(proba)
    }
}

// ─── Regression tree (boosting) ───────────────────────────────────────────────
#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    pub(crate) fn fit(x: &Array2<f64>, targets: &[f64], max_depth: usize) -> Self {
        let mut builder = TreeBuilder {
            x,
            target: Target::Values(targets),
            max_depth,
            min_samples_split: 2,
            max_features: None,
            rng: StdRng::seed_from_u64(0),
        };
        Self { root: builder.build((0..targets.len()).collect()) }
    }

    pub(crate) fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.root.leaf_for(row).first().copied().unwrap_or(0.0)
    }
}
