// Per-feature standardisation: z = (x - mean) / std. Features with zero
// variance keep a unit scale so they map to 0 instead of NaN.

use ndarray::{Array1, Array2, Axis};

use crate::domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean:  Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn mean / std from the rows of `x` (population std)
    pub fn fit(&mut self, x: &Array2<f64>) -> PipelineResult<()> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::Config("cannot fit a scaler on zero rows".into()))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        let (Some(mean), Some(scale)) = (&self.mean, &self.scale) else {
            return Err(PipelineError::Config("scaler used before fit".into()));
        };
        if mean.len() != x.ncols() {
            return Err(PipelineError::Config(format!(
                "scaler was fitted on {} features, got {}",
                mean.len(),
                x.ncols()
            )));
        }
        Ok((x - mean) / scale)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}
