// ============================================================
// Layer 4: Dataset Index
// ============================================================
// Enumerates (path, label) pairs from a root folder laid out as
// one sub-folder per diagnostic class:
//
//   data_root/
//     CN/   sub-001.nii.gz  sub-002.nii.gz ...
//     MCI/  sub-101.nii.gz ...
//     AD/   sub-201.nii.gz ...
//
// Classes are visited in configured order and files are sorted by
// name inside each class, so the index is identical between runs.
// A missing or empty class folder is a configuration error.

use std::{fs, path::Path};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::{ClassSet, SampleRef};

/// Default volume file extensions (NIfTI, plain and gzipped)
pub const DEFAULT_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

#[derive(Debug, Clone)]
pub struct DatasetIndex {
    classes: ClassSet,
    entries: Vec<SampleRef>,
}

impl DatasetIndex {
    /// Walk `root/<class>/` for every class and collect volume files.
    pub fn scan(root: &Path, classes: &ClassSet, extensions: &[String]) -> PipelineResult<Self> {
        if classes.is_empty() {
            return Err(PipelineError::Config("class list is empty".into()));
        }
        if !root.is_dir() {
            return Err(PipelineError::Config(format!(
                "data root '{}' is not a directory",
                root.display()
            )));
        }

        let mut entries = Vec::new();

        for (label, class_name) in classes.names().iter().enumerate() {
            let class_dir = root.join(class_name);
            if !class_dir.is_dir() {
                return Err(PipelineError::Config(format!(
                    "class folder '{}' is missing",
                    class_dir.display()
                )));
            }

            let mut files: Vec<(String, std::path::PathBuf)> = Vec::new();
            for entry in fs::read_dir(&class_dir)? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(id) = strip_volume_extension(name, extensions) {
                    files.push((id.to_string(), path.clone()));
                }
            }

            if files.is_empty() {
                return Err(PipelineError::Config(format!(
                    "class folder '{}' contains no volumes",
                    class_dir.display()
                )));
            }

            files.sort_by(|a, b| a.1.cmp(&b.1));
            tracing::debug!("Class '{}': {} volumes", class_name, files.len());

            entries.extend(files.into_iter().map(|(id, path)| SampleRef::new(id, path, label)));
        }

        tracing::info!(
            "Indexed {} volumes across {} classes under '{}'",
            entries.len(),
            classes.len(),
            root.display()
        );

        Ok(Self { classes: classes.clone(), entries })
    }

    pub fn entries(&self) -> &[SampleRef] {
        &self.entries
    }

    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.label).collect()
    }

    /// Number of samples per class, in label order
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for e in &self.entries {
            counts[e.label] += 1;
        }
        counts
    }
}

/// Returns the subject id if `file_name` ends in one of `extensions`
fn strip_volume_extension<'a>(file_name: &'a str, extensions: &[String]) -> Option<&'a str> {
    extensions
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext.as_str()))
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_scan_orders_by_class_then_name() {
        let root = scratch_dir("index_order");
        touch(&root.join("CN"), "b.nii.gz");
        touch(&root.join("CN"), "a.nii");
        touch(&root.join("MCI"), "m.nii.gz");
        touch(&root.join("AD"), "z.nii.gz");
        touch(&root.join("AD"), "notes.txt");

        let index = DatasetIndex::scan(&root, &ClassSet::default(), &exts()).unwrap();
        let ids: Vec<&str> = index.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "m", "z"]);
        assert_eq!(index.labels(), vec![0, 0, 1, 2]);
        assert_eq!(index.class_counts(), vec![2, 1, 1]);
    }

    #[test]
    fn test_missing_class_folder_is_config_error() {
        let root = scratch_dir("index_missing");
        touch(&root.join("CN"), "a.nii");
        touch(&root.join("MCI"), "b.nii");

        let err = DatasetIndex::scan(&root, &ClassSet::default(), &exts()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("AD"));
    }

    #[test]
    fn test_empty_class_folder_is_config_error() {
        let root = scratch_dir("index_empty");
        touch(&root.join("CN"), "a.nii");
        touch(&root.join("MCI"), "b.nii");
        touch(&root.join("AD"), "readme.md");

        let err = DatasetIndex::scan(&root, &ClassSet::default(), &exts()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_strip_extension_prefers_longest_listed_first() {
        let e = exts();
        assert_eq!(strip_volume_extension("s1.nii.gz", &e), Some("s1"));
        assert_eq!(strip_volume_extension("s1.nii", &e), Some("s1"));
        assert_eq!(strip_volume_extension(".nii", &e), None);
        assert_eq!(strip_volume_extension("s1.mgz", &e), None);
    }
}
