// ============================================================
// Layer 4: Volume Loader
// ============================================================
// Reads a volume file and returns a plain 3D f32 array. The format
// follows the file name:
//
//   .mgz / .mgh     → FreeSurfer MGH via `neuroformats` (FastSurfer
//                     segmentations are written this way)
//   anything else   → NIfTI (.nii / .nii.gz) via `nifti`
//
// The reader applies the header's scl_slope / scl_inter, so the
// values we get back are already in scanner units. Some exports
// store a T1 volume as X×Y×Z×1; trailing singleton axes are
// squeezed away before the 3D check.
//
// A file is rejected (PipelineError::Data) when:
//   - it cannot be parsed in its format
//   - it is not 3D after squeezing
//   - any dimension is zero
//
// Reference: nifti crate documentation (ReaderOptions, IntoNdArray)
//            neuroformats crate documentation (read_mgh)

use std::path::Path;

use ndarray::{Array3, ArrayD, Axis, Ix3, IxDyn};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::traits::VolumeSource;

/// Loads NIfTI and MGH volumes from disk. Implements VolumeSource.
#[derive(Debug, Clone, Default)]
pub struct VolumeLoader;

impl VolumeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeSource for VolumeLoader {
    fn load(&self, path: &Path) -> PipelineResult<Array3<f32>> {
        let data = if is_mgh(path) { read_mgh(path)? } else { read_nifti(path)? };

        let volume = squeeze_to_3d(data).map_err(|reason| PipelineError::data(path, reason))?;
        tracing::debug!("Loaded '{}' with shape {:?}", path.display(), volume.dim());
        Ok(volume)
    }
}

pub(crate) fn is_mgh(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("mgz") || e.eq_ignore_ascii_case("mgh"))
}

fn read_nifti(path: &Path) -> PipelineResult<ArrayD<f32>> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| PipelineError::data(path, format!("not a readable NIfTI file: {e}")))?;

    object
        .into_volume()
        .into_ndarray::<f32>()
        .map_err(|e| PipelineError::data(path, format!("cannot decode voxel data: {e}")))
}

fn read_mgh(path: &Path) -> PipelineResult<ArrayD<f32>> {
    let mgh = neuroformats::read_mgh(path)
        .map_err(|e| PipelineError::data(path, format!("not a readable MGH file: {e:?}")))?;

    // exactly one of the typed arrays is filled, depending on the header's dtype
    let data = mgh.data;
    let converted = if let Some(a) = data.mri_uchar {
        to_dyn(a.shape(), a.iter().map(|&v| v as f32))
    } else if let Some(a) = data.mri_short {
        to_dyn(a.shape(), a.iter().map(|&v| v as f32))
    } else if let Some(a) = data.mri_int {
        to_dyn(a.shape(), a.iter().map(|&v| v as f32))
    } else if let Some(a) = data.mri_float {
        to_dyn(a.shape(), a.iter().copied())
    } else {
        Err("MGH file holds no voxel data".to_string())
    };
    converted.map_err(|reason| PipelineError::data(path, reason))
}

fn to_dyn(shape: &[usize], values: impl Iterator<Item = f32>) -> Result<ArrayD<f32>, String> {
    ArrayD::from_shape_vec(IxDyn(shape), values.collect())
        .map_err(|e| format!("cannot shape MGH voxel data: {e}"))
}

/// Drop trailing length-1 axes, then require exactly three non-empty axes.
pub(crate) fn squeeze_to_3d(mut data: ArrayD<f32>) -> Result<Array3<f32>, String> {
    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }

    if data.ndim() != 3 {
        return Err(format!("expected a 3D volume, found shape {:?}", data.shape()));
    }
    if data.shape().iter().any(|&d| d == 0) {
        return Err(format!("degenerate shape {:?}", data.shape()));
    }

    data.into_dimensionality::<Ix3>()
        .map_err(|e| format!("cannot view volume as 3D: {e}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scratch_dir, write_mgh_labels, write_volume};

    #[test]
    fn test_squeeze_trailing_singleton() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[4, 5, 6, 1]));
        assert_eq!(squeeze_to_3d(data).unwrap().dim(), (4, 5, 6));
    }

    #[test]
    fn test_rejects_true_4d() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[4, 5, 6, 2]));
        assert!(squeeze_to_3d(data).is_err());
    }

    #[test]
    fn test_rejects_2d_and_zero_dims() {
        assert!(squeeze_to_3d(ArrayD::<f32>::zeros(IxDyn(&[4, 5]))).is_err());
        assert!(squeeze_to_3d(ArrayD::<f32>::zeros(IxDyn(&[4, 0, 6]))).is_err());
    }

    #[test]
    fn test_loads_written_volume() {
        let dir = scratch_dir("loader_roundtrip");
        let path = dir.join("sub-01.nii");
        let volume = Array3::from_shape_fn((6, 7, 8), |(x, y, z)| (x + 2 * y + 3 * z) as f32);
        write_volume(&path, &volume);

        let loaded = VolumeLoader::new().load(&path).unwrap();
        assert_eq!(loaded.dim(), (6, 7, 8));
        assert!((loaded[[5, 6, 7]] - volume[[5, 6, 7]]).abs() < 1e-4);
    }

    #[test]
    fn test_garbage_file_is_data_error() {
        let dir = scratch_dir("loader_garbage");
        let path = dir.join("broken.nii");
        std::fs::write(&path, b"definitely not nifti").unwrap();

        let err = VolumeLoader::new().load(&path).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_loads_mgh_labels() {
        let dir = scratch_dir("loader_mgh");
        let path = dir.join("aseg.mgh");
        let mut labels = ndarray::Array3::<u8>::zeros((4, 5, 6));
        labels[[3, 1, 5]] = 17;
        labels[[0, 4, 2]] = 53;
        write_mgh_labels(&path, &labels);

        let loaded = VolumeLoader::new().load(&path).unwrap();
        assert_eq!(loaded.dim(), (4, 5, 6));
        assert_eq!(loaded[[3, 1, 5]], 17.0);
        assert_eq!(loaded[[0, 4, 2]], 53.0);
        assert_eq!(loaded.sum(), 70.0);
    }

    #[test]
    fn test_format_follows_extension() {
        assert!(is_mgh(Path::new("sub/mri/aparc.DKTatlas+aseg.deep.mgz")));
        assert!(is_mgh(Path::new("aseg.MGH")));
        assert!(!is_mgh(Path::new("sub-01.nii.gz")));
        assert!(!is_mgh(Path::new("sub-01")));
    }
}
