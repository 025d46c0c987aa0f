// k-nearest neighbours with Euclidean distance. Class probabilities are
// the (optionally inverse-distance weighted) vote shares of the k
// closest training rows.

use ndarray::Array2;

use super::{check_features, check_training_data, ClassicalClassifier};
use crate::domain::error::PipelineResult;

#[derive(Debug, Clone)]
pub struct Knn {
    k:                 usize,
    distance_weighted: bool,
    train:             Option<(Array2<f64>, Vec<usize>)>,
    n_classes:         usize,
}

impl Knn {
    pub fn new(k: usize, distance_weighted: bool) -> Self {
        Self { k: k.max(1), distance_weighted, train: None, n_classes: 0 }
    }
}

impl ClassicalClassifier for Knn {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        self.train = Some((x.clone(), y.to_vec()));
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.train.as_ref().map(|(t, _)| t.ncols()))?;
        let Some((train_x, train_y)) = &self.train else {
            return Ok(Array2::zeros((0, self.n_classes)));
        };
        let k = self.k.min(train_y.len());

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let mut dists: Vec<(f64, usize)> = train_x
                .rows()
                .into_iter()
                .zip(train_y)
                .map(|(t, &label)| {
                    let d2: f64 = t.iter().zip(row.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                    (d2.sqrt(), label)
                })
                .collect();
            dists.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut total = 0.0;
            for &(d, label) in &dists[..k] {
                let w = if self.distance_weighted { 1.0 / (d + 1e-12) } else { 1.0 };
                proba[[i, label]] += w;
                total += w;
            }
            proba.row_mut(i).mapv_inplace(|v| v / total);
        }
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classical::tests::assert_learns_blobs;
    use ndarray::array;

    #[test]
    fn test_learns_blobs() {
        assert_learns_blobs(&mut Knn::new(5, false), 0.95);
        assert_learns_blobs(&mut Knn::new(5, true), 0.95);
    }

    #[test]
    fn test_vote_shares() {
        let x = array![[0.0], [0.1], [0.2], [5.0]];
        let mut knn = Knn::new(3, false);
        knn.fit(&x, &[0, 0, 1, 1], 2).unwrap();
        let p = knn.predict_proba(&array![[0.05]]).unwrap();
        assert!((p[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(knn.predict(&array![[4.0]]).unwrap(), vec![1]);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = Knn::new(10, false);
        knn.fit(&array![[0.0], [1.0]], &[0, 1], 2).unwrap();
        let p = knn.predict_proba(&array![[0.0]]).unwrap();
        assert!((p[[0, 0]] - 0.5).abs() < 1e-12);
    }
}
