// Shared fixtures for unit tests: scratch directories and
// synthetic NIfTI volumes laid out like a class-folder dataset.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::Array3;

use crate::domain::sample::ClassSet;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh, empty directory under the system temp dir
pub fn scratch_dir(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "mri_classify_{}_{}_{}",
        tag,
        std::process::id(),
        n
    ));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write `volume` as an uncompressed NIfTI-1 file
pub fn write_volume(path: &Path, volume: &Array3<f32>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    nifti::writer::WriterOptions::new(path)
        .write_nifti(volume)
        .unwrap();
}

/// Create `root/<class>/s<class>_<i>.nii` volumes, `per_class` per class.
/// Voxel intensities grow with the label so classes are separable.
pub fn synthetic_dataset(tag: &str, classes: &ClassSet, per_class: usize, shape: (usize, usize, usize)) -> PathBuf {
    let root = scratch_dir(tag);
    for (label, name) in classes.names().iter().enumerate() {
        for i in 0..per_class {
            let volume = Array3::from_shape_fn(shape, |(x, y, z)| {
                (label * 100 + i) as f32 + (x + y + z) as f32 * 0.5
            });
            write_volume(&root.join(name).join(format!("s{label}_{i:02}.nii")), &volume);
        }
    }
    root
}

/// VolumeSource backed by a path → array map, for tests that should not touch disk
#[derive(Default)]
pub struct InMemorySource {
    volumes: std::collections::HashMap<PathBuf, Array3<f32>>,
}

impl InMemorySource {
    pub fn insert(&mut self, path: impl Into<PathBuf>, volume: Array3<f32>) {
        self.volumes.insert(path.into(), volume);
    }
}

impl crate::domain::traits::VolumeSource for InMemorySource {
    fn load(&self, path: &Path) -> crate::domain::error::PipelineResult<Array3<f32>> {
        self.volumes
            .get(path)
            .cloned()
            .ok_or_else(|| crate::domain::error::PipelineError::data(path, "no such volume"))
    }
}

/// Write `labels` as an uncompressed FreeSurfer MGH file (uchar, one frame)
pub fn write_mgh_labels(path: &Path, labels: &Array3<u8>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let (w, h, d) = labels.dim();
    let mut bytes = Vec::new();
    // version, width, height, depth, frames, type (0 = uchar), dof
    for v in [1i32, w as i32, h as i32, d as i32, 1, 0, 0] {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    // goodRASflag = 0, the geometry block is unused
    bytes.extend_from_slice(&0i16.to_be_bytes());
    bytes.resize(284, 0);
    // voxels are stored column-major: x varies fastest
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                bytes.push(labels[[x, y, z]]);
            }
        }
    }
    fs::write(path, bytes).unwrap();
}
