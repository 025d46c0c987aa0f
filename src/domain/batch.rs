// ============================================================
// Layer 3: Volume Batch
// ============================================================
// Stacks N samples of identical shape into one host array with a
// singleton channel axis:
//
//   Vec<Sample> (each D×H×W)  →  volumes: N×1×D×H×W
//                                labels:  N
//
// Built fresh for every training / evaluation step and dropped
// afterwards. The ml layer turns it into a burn tensor.

use ndarray::{Array5, Axis};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::Sample;

#[derive(Debug, Clone)]
pub struct VolumeBatch {
    pub ids: Vec<String>,
    pub labels: Vec<usize>,
    /// Shape: (batch, channels = 1, depth, height, width)
    pub volumes: Array5<f32>,
}

impl VolumeBatch {
    /// Stack samples into a batch. All volumes must share one shape.
    pub fn from_samples(samples: Vec<Sample>) -> PipelineResult<Self> {
        let first = samples
            .first()
            .ok_or_else(|| PipelineError::Config("cannot build an empty batch".into()))?;
        let [d, h, w] = first.shape();

        let mut volumes = Array5::<f32>::zeros((samples.len(), 1, d, h, w));
        let mut ids = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());

        for (i, sample) in samples.into_iter().enumerate() {
            if sample.shape() != [d, h, w] {
                return Err(PipelineError::Config(format!(
                    "sample '{}' has shape {:?}, batch expects {:?}",
                    sample.id,
                    sample.shape(),
                    [d, h, w]
                )));
            }
            volumes
                .index_axis_mut(Axis(0), i)
                .index_axis_mut(Axis(0), 0)
                .assign(&sample.volume);
            ids.push(sample.id);
            labels.push(sample.label);
        }

        Ok(Self { ids, labels, volumes })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// [batch, channels, depth, height, width]
    pub fn dims(&self) -> [usize; 5] {
        let s = self.volumes.shape();
        [s[0], s[1], s[2], s[3], s[4]]
    }
}
