// ============================================================
// Layer 3: Samples and Class Labels
// ============================================================
// A SampleRef is one Dataset Index entry (where the volume lives
// and which diagnostic folder it came from). A Sample is that
// entry after loading and preprocessing: an immutable 3D array.
//
// Samples are never cached; every access re-reads the file.

use std::path::PathBuf;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Default diagnostic categories, in label order
pub const DEFAULT_CLASSES: [&str; 3] = ["CN", "MCI", "AD"];

/// Ordered list of class names. A label is an index into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSet {
    names: Vec<String>,
}

impl ClassSet {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, label: usize) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn label_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for ClassSet {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSES)
    }
}

/// One (path, label) pair produced by the Dataset Index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRef {
    /// Subject identifier (file name without the volume extension)
    pub id: String,
    pub path: PathBuf,
    pub label: usize,
}

impl SampleRef {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, label: usize) -> Self {
        Self { id: id.into(), path: path.into(), label }
    }
}

/// A loaded, preprocessed volume with its label
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: String,
    pub label: usize,
    /// Shape: (depth, height, width), intensities in [0, 1]
    pub volume: Array3<f32>,
}

impl Sample {
    pub fn shape(&self) -> [usize; 3] {
        let (d, h, w) = self.volume.dim();
        [d, h, w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classes_are_cn_mci_ad() {
        let classes = ClassSet::default();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes.name(0), Some("CN"));
        assert_eq!(classes.label_of("AD"), Some(2));
        assert_eq!(classes.label_of("FTD"), None);
    }

    #[test]
    fn test_sample_shape() {
        let s = Sample { id: "s1".into(), label: 1, volume: Array3::zeros((4, 5, 6)) };
        assert_eq!(s.shape(), [4, 5, 6]);
    }
}
