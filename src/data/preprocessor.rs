// ============================================================
// Layer 4: Volume Preprocessor
// ============================================================
// Turns a raw scanner volume into a fixed-shape array in [0, 1].
//
// Steps (applied in order):
//   1. Reject degenerate shapes (any zero dimension)
//   2. Percentile clipping: values below p_low / above p_high are
//      clamped to those percentiles
//   3. Linear rescale of [p_low, p_high] onto [0, 1]
//   4. Optional crop to the foreground bounding box
//   5. Trilinear resize to the target shape
//
// Clipping and rescaling are both monotone, so voxel ordering is
// preserved (ties can appear only among clipped voxels).
//
// Reference: ndarray documentation (Array3, slicing)

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

/// Preprocessing options, part of the experiment config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Output shape (depth, height, width)
    pub target_shape: [usize; 3],
    /// Lower clip percentile in [0, 100)
    pub clip_low_percentile: f32,
    /// Upper clip percentile in (clip_low, 100]
    pub clip_high_percentile: f32,
    /// Crop to the bounding box of voxels above `foreground_threshold`
    /// (after normalisation) before resizing
    pub crop_foreground: bool,
    pub foreground_threshold: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_shape:         [32, 112, 112],
            clip_low_percentile:  1.0,
            clip_high_percentile: 99.0,
            crop_foreground:      false,
            foreground_threshold: 0.05,
        }
    }
}

impl PreprocessConfig {
    /// Fail fast on shapes and percentile bounds that cannot work
    pub fn validate(&self) -> PipelineResult<()> {
        if self.target_shape.iter().any(|&d| d == 0) {
            return Err(PipelineError::Config(format!(
                "target shape {:?} has a zero dimension",
                self.target_shape
            )));
        }
        let (lo, hi) = (self.clip_low_percentile, self.clip_high_percentile);
        if !(0.0..=100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo >= hi {
            return Err(PipelineError::Config(format!(
                "clip percentiles must satisfy 0 <= low < high <= 100, got ({lo}, {hi})"
            )));
        }
        if !(0.0..1.0).contains(&self.foreground_threshold) {
            return Err(PipelineError::Config(format!(
                "foreground threshold must be in [0, 1), got {}",
                self.foreground_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Full chain: shape check → normalise → (crop) → resize.
    /// The output shape always equals the configured target shape.
    pub fn process(&self, raw: &Array3<f32>) -> PipelineResult<Array3<f32>> {
        let (d, h, w) = raw.dim();
        if d == 0 || h == 0 || w == 0 {
            return Err(PipelineError::data(
                "<in-memory volume>",
                format!("cannot preprocess a degenerate volume of shape {:?}", raw.dim()),
            ));
        }

        let normalized = self.normalize(raw);
        let cropped = if self.config.crop_foreground {
            crop_foreground(&normalized, self.config.foreground_threshold)
        } else {
            normalized
        };
        Ok(resize_trilinear(&cropped, self.config.target_shape))
    }

    /// Percentile clip, then linear rescale to [0, 1].
    /// A constant volume maps to all zeros; NaN / ±inf voxels map to 0.
    pub fn normalize(&self, volume: &Array3<f32>) -> Array3<f32> {
        let mut finite: Vec<f32> = volume.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Array3::zeros(volume.dim());
        }
        finite.sort_unstable_by(|a, b| a.total_cmp(b));

        let lo = percentile_sorted(&finite, self.config.clip_low_percentile);
        let hi = percentile_sorted(&finite, self.config.clip_high_percentile);
        let range = hi - lo;

        if range <= f32::EPSILON * lo.abs().max(1.0) {
            return Array3::zeros(volume.dim());
        }

        volume.mapv(|v| {
            if !v.is_finite() {
                return 0.0;
            }
            ((v.clamp(lo, hi) - lo) / range).clamp(0.0, 1.0)
        })
    }
}

/// Linear-interpolated percentile of an ascending slice (p in [0, 100])
pub fn percentile_sorted(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let frac = pos - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Crop to the bounding box of voxels strictly above `threshold`.
/// An all-background volume is returned unchanged.
pub fn crop_foreground(volume: &Array3<f32>, threshold: f32) -> Array3<f32> {
    let (d, h, w) = volume.dim();
    let mut min = [d, h, w];
    let mut max = [0usize; 3];
    let mut found = false;

    for ((z, y, x), &v) in volume.indexed_iter() {
        if v > threshold {
            found = true;
            min = [min[0].min(z), min[1].min(y), min[2].min(x)];
            max = [max[0].max(z), max[1].max(y), max[2].max(x)];
        }
    }

    if !found {
        return volume.clone();
    }

    volume
        .slice(s![min[0]..=max[0], min[1]..=max[1], min[2]..=max[2]])
        .to_owned()
}

/// Source taps per output index along one axis: (source index, weight),
/// with the weights of each output summing to 1.
///
/// Up to a 2x reduction this is linear interpolation at half-pixel
/// centres. Beyond that two taps would skip source voxels, so each
/// output averages its whole source footprint instead.
fn axis_taps(in_len: usize, out_len: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = in_len as f32 / out_len as f32;
    (0..out_len)
        .map(|o| {
            if in_len > 2 * out_len {
                let start = o as f32 * scale;
                let end = start + scale;
                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(in_len);
                (first..last)
                    .filter_map(|i| {
                        let overlap = end.min(i as f32 + 1.0) - start.max(i as f32);
                        (overlap > 0.0).then_some((i, overlap / scale))
                    })
                    .collect()
            } else {
                // Half-pixel centres, clamped at the borders
                let src = ((o as f32 + 0.5) * scale - 0.5).clamp(0.0, (in_len - 1) as f32);
                let i0 = src.floor() as usize;
                let i1 = (i0 + 1).min(in_len - 1);
                let t = src - i0 as f32;
                vec![(i0, 1.0 - t), (i1, t)]
            }
        })
        .collect()
}

/// Resample one axis of `volume` with precomputed taps.
fn resample_axis(volume: &Array3<f32>, axis: usize, taps: &[Vec<(usize, f32)>]) -> Array3<f32> {
    let (d, h, w) = volume.dim();
    let mut shape = [d, h, w];
    shape[axis] = taps.len();

    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(z, y, x)| {
        let mut index = [z, y, x];
        taps[index[axis]]
            .iter()
            .map(|&(i, weight)| {
                index[axis] = i;
                volume[index] * weight
            })
            .sum()
    })
}

/// Trilinear resize to exactly `target` (depth, height, width), one
/// axis at a time. Reductions beyond 2x average the source footprint.
pub fn resize_trilinear(volume: &Array3<f32>, target: [usize; 3]) -> Array3<f32> {
    let (d, h, w) = volume.dim();
    let mut resized = volume.clone();
    for (axis, (&in_len, &out_len)) in [d, h, w].iter().zip(target.iter()).enumerate() {
        if in_len != out_len {
            resized = resample_axis(&resized, axis, &axis_taps(in_len, out_len));
        }
    }
    resized
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_clip(target: [usize; 3]) -> Preprocessor {
        Preprocessor::new(PreprocessConfig {
            target_shape: target,
            clip_low_percentile: 0.0,
            clip_high_percentile: 100.0,
            ..PreprocessConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_sorted(&v, 0.0), 0.0);
        assert_eq!(percentile_sorted(&v, 100.0), 40.0);
        assert!((percentile_sorted(&v, 50.0) - 20.0).abs() < 1e-6);
        assert!((percentile_sorted(&v, 12.5) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_known_min_max() {
        let p = no_clip([2, 2, 2]);
        let v = Array3::from_shape_vec((2, 2, 2), vec![-50.0, 0.0, 25.0, 50.0, 75.0, 100.0, 125.0, 150.0]).unwrap();
        let n = p.normalize(&v);
        assert_eq!(n[[0, 0, 0]], 0.0);
        assert_eq!(n[[1, 1, 1]], 1.0);
        assert!((n[[0, 1, 0]] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_clip_saturates_outliers() {
        let p = Preprocessor::new(PreprocessConfig {
            target_shape: [1, 1, 1000],
            clip_low_percentile: 1.0,
            clip_high_percentile: 99.0,
            ..PreprocessConfig::default()
        })
        .unwrap();
        let mut values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        values[999] = 1.0e6;
        let v = Array3::from_shape_vec((1, 1, 1000), values).unwrap();
        let n = p.normalize(&v);
        assert_eq!(n[[0, 0, 999]], 1.0);
        assert_eq!(n[[0, 0, 0]], 0.0);
        // Without clipping the mid voxel would sit near 5e-4
        assert!((n[[0, 0, 500]] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_constant_volume_maps_to_zero() {
        let p = no_clip([3, 3, 3]);
        let n = p.normalize(&Array3::from_elem((3, 3, 3), 7.0));
        assert!(n.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nan_voxels_become_zero() {
        let p = no_clip([1, 1, 3]);
        let v = Array3::from_shape_vec((1, 1, 3), vec![f32::NAN, 1.0, 3.0]).unwrap();
        let n = p.normalize(&v);
        assert_eq!(n[[0, 0, 0]], 0.0);
        assert_eq!(n[[0, 0, 2]], 1.0);
    }

    #[test]
    fn test_resize_constant_stays_constant() {
        let v = Array3::from_elem((10, 20, 30), 0.25);
        let r = resize_trilinear(&v, [4, 5, 6]);
        assert_eq!(r.dim(), (4, 5, 6));
        assert!(r.iter().all(|&x| (x - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resize_linear_ramp_is_preserved() {
        // x-ramp sampled at half-pixel centres: 2x downsample averages neighbours
        let v = Array3::from_shape_fn((1, 1, 8), |(_, _, x)| x as f32);
        let r = resize_trilinear(&v, [1, 1, 4]);
        let expected = [0.5, 2.5, 4.5, 6.5];
        for (i, e) in expected.iter().enumerate() {
            assert!((r[[0, 0, i]] - e).abs() < 1e-5);
        }
    }

    #[test]
    fn test_large_reduction_averages_every_voxel() {
        // a spike every 4th voxel; two taps at 16 -> 2 would land on 8.0 / 0.0 pairs
        let v = Array3::from_shape_fn((1, 1, 16), |(_, _, x)| if x % 4 == 3 { 8.0 } else { 0.0 });
        let r = resize_trilinear(&v, [1, 1, 2]);
        assert!((r[[0, 0, 0]] - 2.0).abs() < 1e-5);
        assert!((r[[0, 0, 1]] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_non_integer_reduction_keeps_the_mean() {
        let v = Array3::from_shape_fn((9, 10, 11), |(z, y, x)| ((z * 7 + y * 3 + x) % 5) as f32);
        let r = resize_trilinear(&v, [4, 3, 2]);
        assert_eq!(r.dim(), (4, 3, 2));
        let mean_in = v.mean().unwrap();
        let mean_out = r.mean().unwrap();
        assert!((mean_in - mean_out).abs() < 1e-4, "{mean_in} vs {mean_out}");
    }

    #[test]
    fn test_crop_foreground_bounding_box() {
        let mut v = Array3::<f32>::zeros((6, 6, 6));
        v[[1, 2, 3]] = 1.0;
        v[[3, 4, 4]] = 1.0;
        let c = crop_foreground(&v, 0.5);
        assert_eq!(c.dim(), (3, 3, 2));
    }

    #[test]
    fn test_degenerate_volume_rejected() {
        let p = no_clip([2, 2, 2]);
        let err = p.process(&Array3::zeros((0, 4, 4))).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut c = PreprocessConfig::default();
        c.target_shape = [32, 0, 112];
        assert!(c.validate().is_err());

        let mut c = PreprocessConfig::default();
        c.clip_low_percentile = 99.0;
        c.clip_high_percentile = 1.0;
        assert!(c.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_output_shape_matches_target(
            d in 1usize..12, h in 1usize..12, w in 1usize..12,
            td in 1usize..10, th in 1usize..10, tw in 1usize..10,
            crop in any::<bool>(),
        ) {
            let p = Preprocessor::new(PreprocessConfig {
                target_shape: [td, th, tw],
                crop_foreground: crop,
                ..PreprocessConfig::default()
            }).unwrap();
            let raw = Array3::from_shape_fn((d, h, w), |(z, y, x)| ((z * 7 + y * 3 + x) % 11) as f32);
            let out = p.process(&raw).unwrap();
            prop_assert_eq!(out.dim(), (td, th, tw));
        }

        #[test]
        fn prop_normalize_bounded_and_monotone(
            values in prop::collection::vec(-1.0e4f32..1.0e4, 2..200),
        ) {
            let n = values.len();
            let p = no_clip([1, 1, n]);
            let v = Array3::from_shape_vec((1, 1, n), values.clone()).unwrap();
            let out = p.normalize(&v);

            for i in 0..n {
                prop_assert!((0.0..=1.0).contains(&out[[0, 0, i]]));
                for j in 0..n {
                    if values[i] < values[j] {
                        prop_assert!(out[[0, 0, i]] <= out[[0, 0, j]]);
                    }
                }
            }
        }
    }
}
