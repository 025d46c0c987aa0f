// ============================================================
// Layer 2: Experiment Configuration
// ============================================================
// Every knob of a run in one serde struct, read from a JSON file.
// Every field has a default, so a config file only lists what it
// changes:
//
//   {
//     "data_root": "/data/adni",
//     "architecture": "densenet3d",
//     "trainer": { "max_epochs": 80, "patience": 15 }
//   }
//
// `validate` runs before any data is touched, so a typo in the
// config fails in milliseconds rather than after the first fold.
// A copy of the effective config is written next to the results.
//
// Reference: serde documentation (container attribute `default`)

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::data::{
    augmenter::{AugmentConfig, Augmenter},
    dataset::VolumeDataset,
    index::{DatasetIndex, DEFAULT_EXTENSIONS},
    loader::VolumeLoader,
    preprocessor::{PreprocessConfig, Preprocessor},
    roi::RoiConfig,
};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::{ClassSet, DEFAULT_CLASSES};
use crate::infra::fastsurfer::FastSurferConfig;
use crate::ml::architectures::{Architecture, NetworkConfig};
use crate::ml::classical::{grid_search::expand_grid, ClassifierKind, ParamGrid};
use crate::ml::trainer::TrainerConfig;

// ─── Feature branch ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureBranchConfig {
    /// Classifier kinds to search, in report order
    pub classifiers:    Vec<ClassifierKind>,
    /// Per-kind search spaces; kinds without an entry use their default grid
    pub grids:          BTreeMap<ClassifierKind, ParamGrid>,
    /// Inner stratified folds used by grid search
    pub cv_folds:       usize,
    /// Also write the extracted features of every fold as CSV
    pub write_features: bool,
}

impl Default for FeatureBranchConfig {
    fn default() -> Self {
        Self {
            classifiers:    ClassifierKind::ALL.to_vec(),
            grids:          BTreeMap::new(),
            cv_folds:       3,
            write_features: true,
        }
    }
}

impl FeatureBranchConfig {
    pub fn grid_for(&self, kind: ClassifierKind) -> ParamGrid {
        self.grids.get(&kind).cloned().unwrap_or_else(|| kind.default_grid())
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.classifiers.is_empty() {
            return Err(PipelineError::Config("features.classifiers is empty".into()));
        }
        if self.cv_folds < 2 {
            return Err(PipelineError::Config(format!(
                "features.cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        // building an unfitted model checks every parameter name and value
        for &kind in &self.classifiers {
            for params in expand_grid(&self.grid_for(kind))? {
                kind.build(&params, 0)?;
            }
        }
        Ok(())
    }
}

// ─── ExperimentConfig ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Folder with one sub-folder per class
    pub data_root:     PathBuf,
    /// Checkpoints, metrics and reports are written below this
    pub output_dir:    PathBuf,
    /// Class folder names, in label order
    pub classes:       Vec<String>,
    /// Accepted volume file endings
    pub extensions:    Vec<String>,
    pub architecture:  Architecture,
    pub base_channels: usize,
    pub dropout:       f64,
    /// Outer cross-validation folds
    pub folds:         usize,
    /// Abort on the first unreadable volume instead of skipping it
    pub strict:        bool,
    pub preprocess:    PreprocessConfig,
    pub augment:       AugmentConfig,
    pub roi:           RoiConfig,
    pub trainer:       TrainerConfig,
    pub features:      FeatureBranchConfig,
    pub fastsurfer:    FastSurferConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_root:     PathBuf::from("data"),
            output_dir:    PathBuf::from("results"),
            classes:       DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
            extensions:    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            architecture:  Architecture::ResNet3d,
            base_channels: 16,
            dropout:       0.3,
            folds:         5,
            strict:        false,
            preprocess:    PreprocessConfig::default(),
            augment:       AugmentConfig::default(),
            roi:           RoiConfig::default(),
            trainer:       TrainerConfig::default(),
            features:      FeatureBranchConfig::default(),
            fastsurfer:    FastSurferConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Config(format!("cannot parse config '{}': {e}", path.display()))
        })?;
        config.validate()?;
        tracing::debug!("Loaded experiment config from '{}'", path.display());
        Ok(config)
    }

    /// Write the effective config as pretty JSON
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::Config(msg));

        if self.classes.len() < 2 {
            return fail(format!("at least two classes are needed, got {:?}", self.classes));
        }
        let unique: HashSet<&String> = self.classes.iter().collect();
        if unique.len() != self.classes.len() {
            return fail(format!("class names must be unique, got {:?}", self.classes));
        }
        if self.extensions.is_empty() {
            return fail("extensions is empty".into());
        }
        if self.folds < 2 {
            return fail(format!("folds must be at least 2, got {}", self.folds));
        }
        if self.base_channels == 0 {
            return fail("base_channels must be positive".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }

        self.preprocess.validate()?;
        self.augment.validate()?;
        self.roi.validate()?;
        self.trainer.validate()?;
        self.features.validate()?;
        self.fastsurfer.validate()?;
        Ok(())
    }

    pub fn class_set(&self) -> ClassSet {
        ClassSet::new(self.classes.iter().cloned())
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(self.classes.len())
            .with_base_channels(self.base_channels)
            .with_dropout(self.dropout)
    }

    /// Scan `data_root` and bind the entries to the NIfTI loading chain
    pub fn open_dataset(&self) -> PipelineResult<(DatasetIndex, VolumeDataset)> {
        let index = DatasetIndex::scan(&self.data_root, &self.class_set(), &self.extensions)?;
        let dataset = VolumeDataset::new(
            index.entries().to_vec(),
            Arc::new(VolumeLoader::new()),
            Preprocessor::new(self.preprocess.clone())?,
        )
        .with_augmenter(Augmenter::new(self.augment.clone())?)
        .with_roi(self.roi.clone())
        .with_strict(self.strict);
        Ok((index, dataset))
    }
}
