// Shallow neural network: one ReLU hidden layer and a softmax output,
// trained full-batch with Adam on cross-entropy plus an L2 penalty
// (alpha / 2n · ‖W‖²). Weights start from He-normal draws.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{check_features, check_training_data, softmax_in_place, ClassicalClassifier};
use crate::domain::error::{PipelineError, PipelineResult};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy)]
pub struct MlpParams {
    pub hidden:        usize,
    pub learning_rate: f64,
    pub epochs:        usize,
    pub alpha:         f64,
}

#[derive(Debug, Clone)]
struct Layers {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl Layers {
    /// (hidden pre-activations, output probabilities)
    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let z1 = x.dot(&self.w1) + &self.b1;
        let h = z1.mapv(|v| v.max(0.0));
        let mut out = h.dot(&self.w2) + &self.b2;
        softmax_in_place(&mut out);
        (z1, out)
    }
}

/// First and second moment estimates for one parameter tensor
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f64, D>) -> Self {
        Self { m: Array::zeros(param.raw_dim()), v: Array::zeros(param.raw_dim()) }
    }

    fn step(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, lr: f64, t: i32) {
        let c1 = 1.0 - BETA1.powi(t);
        let c2 = 1.0 - BETA2.powi(t);
        Zip::from(param).and(&mut self.m).and(&mut self.v).and(grad).for_each(|p, m, v, &g| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr * (*m / c1) / ((*v / c2).sqrt() + EPSILON);
        });
    }
}

#[derive(Debug, Clone)]
pub struct Mlp {
    params: MlpParams,
    seed:   u64,
    layers: Option<Layers>,
}

impl Mlp {
    pub fn new(params: MlpParams, seed: u64) -> Self {
        Self { params, seed, layers: None }
    }

    fn init(&self, d: usize, k: usize) -> PipelineResult<Layers> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut he = |fan_in: usize, shape: (usize, usize)| -> PipelineResult<Array2<f64>> {
            let normal = Normal::new(0.0, (2.0 / fan_in as f64).sqrt())
                .map_err(|e| PipelineError::Config(format!("weight init: {e}")))?;
            Ok(Array2::from_shape_simple_fn(shape, || normal.sample(&mut rng)))
        };
        let h = self.params.hidden;
        Ok(Layers {
            w1: he(d, (d, h))?,
            b1: Array1::zeros(h),
            w2: he(h, (h, k))?,
            b2: Array1::zeros(k),
        })
    }
}

impl ClassicalClassifier for Mlp {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> PipelineResult<()> {
        check_training_data(x, y, n_classes)?;
        let n = x.nrows() as f64;
        let mut layers = self.init(x.ncols(), n_classes)?;

        let mut targets = Array2::<f64>::zeros((y.len(), n_classes));
        for (i, &label) in y.iter().enumerate() {
            targets[[i, label]] = 1.0;
        }

        let mut m_w1 = Moments::like(&layers.w1);
        let mut m_b1 = Moments::like(&layers.b1);
        let mut m_w2 = Moments::like(&layers.w2);
        let mut m_b2 = Moments::like(&layers.b2);
        let lr = self.params.learning_rate;
        let reg = self.params.alpha / n;

        for epoch in 1..=self.params.epochs {
            let (z1, out) = layers.forward(x);
            let h = z1.mapv(|v| v.max(0.0));

            let d_out = (out - &targets) / n;
            let g_w2 = h.t().dot(&d_out) + &(&layers.w2 * reg);
            let g_b2 = d_out.sum_axis(Axis(0));

            let mut d_hidden = d_out.dot(&layers.w2.t());
            Zip::from(&mut d_hidden).and(&z1).for_each(|g, &z| {
                if z <= 0.0 {
                    *g = 0.0;
                }
            });
            let g_w1 = x.t().dot(&d_hidden) + &(&layers.w1 * reg);
            let g_b1 = d_hidden.sum_axis(Axis(0));

            let t = epoch.min(i32::MAX as usize) as i32;
            m_w1.step(&mut layers.w1, &g_w1, lr, t);
            m_b1.step(&mut layers.b1, &g_b1, lr, t);
            m_w2.step(&mut layers.w2, &g_w2, lr, t);
            m_b2.step(&mut layers.b2, &g_b2, lr, t);
        }

        self.layers = Some(layers);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        check_features(x, self.layers.as_ref().map(|l| l.w1.nrows()))?;
        match &self.layers {
            Some(layers) => Ok(layers.forward(x).1),
            None => Ok(Array2::zeros((0, 0))),
        }
    }
}
