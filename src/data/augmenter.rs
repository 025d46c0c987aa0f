// ============================================================
// Layer 4: Training-time Augmenter
// ============================================================
// Randomised spatial and intensity transforms applied to
// preprocessed volumes during training only.
//
// Chain (each step has its own enable switch via probability 0):
//   1. Rotation      small angle in one randomly chosen plane,
//                    trilinear resampling about the centre
//   2. Translation   integer voxel shift per axis, zero fill
//   3. Flip          left-right mirror along the last axis
//   4. Intensity     v * scale + shift, optional Gaussian noise,
//                    clamped back to [0, 1]
//
// `apply` is a pure function of (volume, seed): it borrows the
// input, allocates a new output and draws every random number
// from a StdRng seeded with `seed`.
//
// Reference: rand / rand_distr documentation (StdRng, Normal)

use ndarray::{s, Array3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Master switch; when false the training set is never augmented
    pub enabled: bool,
    pub rotation_prob: f64,
    /// Maximum absolute rotation angle in degrees
    pub max_rotation_deg: f32,
    pub translation_prob: f64,
    /// Maximum absolute shift per axis, in voxels
    pub max_translation: usize,
    pub flip_prob: f64,
    pub intensity_prob: f64,
    /// Multiplicative jitter: scale drawn from [1 - s, 1 + s]
    pub intensity_scale: f32,
    /// Additive jitter: shift drawn from [-s, s]
    pub intensity_shift: f32,
    /// Standard deviation of additive Gaussian noise (0 disables)
    pub noise_std: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled:          true,
            rotation_prob:    0.5,
            max_rotation_deg: 10.0,
            translation_prob: 0.5,
            max_translation:  4,
            flip_prob:        0.0,
            intensity_prob:   0.5,
            intensity_scale:  0.1,
            intensity_shift:  0.05,
            noise_std:        0.01,
        }
    }
}

impl AugmentConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        for (name, p) in [
            ("rotation_prob", self.rotation_prob),
            ("translation_prob", self.translation_prob),
            ("flip_prob", self.flip_prob),
            ("intensity_prob", self.intensity_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PipelineError::Config(format!("{name} must be in [0, 1], got {p}")));
            }
        }
        if self.max_rotation_deg < 0.0 || self.intensity_scale < 0.0
            || self.intensity_shift < 0.0 || self.noise_std < 0.0
        {
            return Err(PipelineError::Config("augmentation magnitudes must be non-negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Return an augmented copy of `volume`. Same (volume, seed) → same output.
    pub fn apply(&self, volume: &Array3<f32>, seed: u64) -> Array3<f32> {
        let mut out = volume.to_owned();
        if !self.config.enabled {
            return out;
        }

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(seed);

        if rng.gen_bool(cfg.rotation_prob) && cfg.max_rotation_deg > 0.0 {
            let angle = rng.gen_range(-cfg.max_rotation_deg..=cfg.max_rotation_deg).to_radians();
            let plane = match rng.gen_range(0..3) {
                0 => (0, 1),
                1 => (0, 2),
                _ => (1, 2),
            };
            out = rotate(&out, plane, angle);
        }

        if rng.gen_bool(cfg.translation_prob) && cfg.max_translation > 0 {
            let m = cfg.max_translation as isize;
            let shift = [rng.gen_range(-m..=m), rng.gen_range(-m..=m), rng.gen_range(-m..=m)];
            out = translate(&out, shift);
        }

        if rng.gen_bool(cfg.flip_prob) {
            out = out.slice(s![.., .., ..;-1]).to_owned();
        }

        if rng.gen_bool(cfg.intensity_prob) {
            let scale = 1.0 + rng.gen_range(-cfg.intensity_scale..=cfg.intensity_scale);
            let shift = rng.gen_range(-cfg.intensity_shift..=cfg.intensity_shift);
            out.mapv_inplace(|v| v * scale + shift);

            if cfg.noise_std > 0.0 {
                if let Ok(noise) = Normal::new(0.0f32, cfg.noise_std) {
                    out.mapv_inplace(|v| v + noise.sample(&mut rng));
                }
            }
            out.mapv_inplace(|v| v.clamp(0.0, 1.0));
        }

        out
    }
}

/// Trilinear sample with zero outside the volume
fn sample(volume: &Array3<f32>, p: [f32; 3]) -> f32 {
    let dims = volume.shape();
    let mut base = [0usize; 3];
    let mut frac = [0.0f32; 3];
    for a in 0..3 {
        if p[a] < 0.0 || p[a] > (dims[a] - 1) as f32 {
            return 0.0;
        }
        base[a] = p[a].floor() as usize;
        frac[a] = p[a] - base[a] as f32;
    }

    let mut acc = 0.0;
    for corner in 0..8usize {
        let mut idx = [0usize; 3];
        let mut weight = 1.0;
        for a in 0..3 {
            let up = (corner >> a) & 1 == 1;
            idx[a] = if up { (base[a] + 1).min(dims[a] - 1) } else { base[a] };
            weight *= if up { frac[a] } else { 1.0 - frac[a] };
        }
        if weight > 0.0 {
            acc += weight * volume[idx];
        }
    }
    acc
}

/// Rotate by `angle` radians within the plane spanned by two axes.
pub fn rotate(volume: &Array3<f32>, plane: (usize, usize), angle: f32) -> Array3<f32> {
    let dims = volume.shape();
    let centre = [
        (dims[0] as f32 - 1.0) / 2.0,
        (dims[1] as f32 - 1.0) / 2.0,
        (dims[2] as f32 - 1.0) / 2.0,
    ];
    let (sin, cos) = angle.sin_cos();
    let (a, b) = plane;

    Array3::from_shape_fn(volume.dim(), |(z, y, x)| {
        let q = [z as f32 - centre[0], y as f32 - centre[1], x as f32 - centre[2]];
        // Inverse mapping: rotate the output coordinate by -angle
        let mut src = [q[0] + centre[0], q[1] + centre[1], q[2] + centre[2]];
        src[a] = cos * q[a] + sin * q[b] + centre[a];
        src[b] = -sin * q[a] + cos * q[b] + centre[b];
        sample(volume, src)
    })
}

/// Shift by whole voxels; uncovered voxels become 0.
pub fn translate(volume: &Array3<f32>, shift: [isize; 3]) -> Array3<f32> {
    let (d, h, w) = volume.dim();
    Array3::from_shape_fn((d, h, w), |(z, y, x)| {
        let sz = z as isize - shift[0];
        let sy = y as isize - shift[1];
        let sx = x as isize - shift[2];
        if sz < 0 || sy < 0 || sx < 0 || sz >= d as isize || sy >= h as isize || sx >= w as isize {
            0.0
        } else {
            volume[[sz as usize, sy as usize, sx as usize]]
        }
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Array3<f32> {
        Array3::from_shape_fn((8, 9, 10), |(z, y, x)| ((z + y + x) as f32 / 24.0).min(1.0))
    }

    fn always() -> AugmentConfig {
        AugmentConfig {
            rotation_prob: 1.0,
            translation_prob: 1.0,
            flip_prob: 1.0,
            intensity_prob: 1.0,
            ..AugmentConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let aug = Augmenter::new(always()).unwrap();
        let v = ramp();
        assert_eq!(aug.apply(&v, 42), aug.apply(&v, 42));
    }

    #[test]
    fn test_input_is_untouched() {
        let aug = Augmenter::new(always()).unwrap();
        let v = ramp();
        let before = v.clone();
        let out = aug.apply(&v, 1);
        assert_eq!(v, before);
        assert_eq!(out.dim(), v.dim());
        assert_ne!(out, v);
    }

    #[test]
    fn test_disabled_is_identity() {
        let aug = Augmenter::new(AugmentConfig { enabled: false, ..always() }).unwrap();
        let v = ramp();
        assert_eq!(aug.apply(&v, 9), v);
    }

    #[test]
    fn test_zero_angle_rotation_is_identity() {
        let v = ramp();
        let r = rotate(&v, (1, 2), 0.0);
        for (a, b) in r.iter().zip(v.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_quarter_turn_on_square_plane() {
        let mut v = Array3::<f32>::zeros((1, 5, 5));
        v[[0, 0, 2]] = 1.0;
        let r = rotate(&v, (1, 2), std::f32::consts::FRAC_PI_2);
        // Mass is preserved and moved off its original voxel
        assert!((r.sum() - 1.0).abs() < 1e-4);
        assert!(r[[0, 0, 2]] < 1e-4);
    }

    #[test]
    fn test_translation_zero_fills() {
        let v = Array3::from_elem((3, 3, 3), 1.0f32);
        let t = translate(&v, [1, 0, -1]);
        assert_eq!(t[[0, 1, 1]], 0.0);
        assert_eq!(t[[1, 1, 2]], 0.0);
        assert_eq!(t[[1, 1, 1]], 1.0);
    }

    #[test]
    fn test_intensity_stays_in_unit_range() {
        let aug = Augmenter::new(AugmentConfig {
            intensity_scale: 0.9,
            intensity_shift: 0.5,
            noise_std: 0.3,
            ..always()
        })
        .unwrap();
        let out = aug.apply(&ramp(), 3);
        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_rejects_bad_probability() {
        let cfg = AugmentConfig { rotation_prob: 1.5, ..AugmentConfig::default() };
        assert!(Augmenter::new(cfg).is_err());
    }
}
