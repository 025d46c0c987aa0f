// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Keeps exactly one "best so far" checkpoint per architecture and
// fold. The model writes its own weight file; this manager owns the
// directory layout and the pointer describing which epoch produced
// those weights.
//
// File naming convention:
//   {output}/checkpoints/
//     resnet3d/
//       fold_0/
//         best.mpk           ← weights (written by the model)
//         best_epoch.json    ← {"epoch": 7, "monitor": "val_loss", "score": 0.41}
//         network.json       ← architecture hyperparameters
//       fold_1/ ...
//
// network.json is written once per fold before training and checked
// before the weights are restored into a freshly built network.
//
// The weights are overwritten on every improvement, so after a run
// the directory always holds the best epoch, not the last one.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::traits::VolumeClassifier;

const WEIGHTS_STEM: &str = "best";
const POINTER_FILE: &str = "best_epoch.json";

/// Name of the network hyperparameter snapshot (`network.json`)
pub const NETWORK_SNAPSHOT: &str = "network";

/// Contents of best_epoch.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub epoch:   usize,
    pub monitor: String,
    pub score:   f64,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Use `dir` directly, creating it (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// `{output}/checkpoints/{architecture}/fold_{fold}`
    pub fn for_fold(output_dir: &Path, architecture: &str, fold: usize) -> PipelineResult<Self> {
        Self::new(
            output_dir
                .join("checkpoints")
                .join(architecture)
                .join(format!("fold_{fold}")),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the model; the model picks the extension
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_STEM)
    }

    /// Overwrite the best checkpoint with the model's current weights.
    pub fn save_best(
        &self,
        model:   &dyn VolumeClassifier,
        epoch:   usize,
        monitor: &str,
        score:   f64,
    ) -> PipelineResult<()> {
        model.save(&self.weights_path())?;

        let pointer = BestCheckpoint { epoch, monitor: monitor.to_string(), score };
        fs::write(self.dir.join(POINTER_FILE), serde_json::to_string_pretty(&pointer)?)?;

        tracing::debug!(
            "New best checkpoint: epoch {} ({}={:.4}) in '{}'",
            epoch, monitor, score, self.dir.display()
        );
        Ok(())
    }

    /// Restore the best weights into `model` and report which epoch they came from.
    pub fn load_best(&self, model: &mut dyn VolumeClassifier) -> PipelineResult<BestCheckpoint> {
        let best = self.best()?;
        model.load(&self.weights_path())?;
        tracing::info!(
            "Restored best checkpoint from epoch {} ({}={:.4})",
            best.epoch, best.monitor, best.score
        );
        Ok(best)
    }

    /// Read best_epoch.json. Fails if no checkpoint has been saved yet.
    pub fn best(&self) -> PipelineResult<BestCheckpoint> {
        let path = self.dir.join(POINTER_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Checkpoint(format!(
                "no best checkpoint in '{}' ({e})",
                self.dir.display()
            ))
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn has_best(&self) -> bool {
        self.dir.join(POINTER_FILE).exists()
    }

    /// Store any serde config next to the weights (`{name}.json`).
    pub fn save_config<T: Serialize>(&self, name: &str, config: &T) -> PipelineResult<()> {
        let path = self.dir.join(format!("{name}.json"));
        fs::write(&path, serde_json::to_string_pretty(config)?)?;
        tracing::debug!("Saved {} to '{}'", name, path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self, name: &str) -> PipelineResult<T> {
        let path = self.dir.join(format!("{name}.json"));
        let json = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Checkpoint(format!("cannot read '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Fail with a Config error when the stored `{name}.json` differs
    /// from `expected`.
    pub fn check_config<T: Serialize>(&self, name: &str, expected: &T) -> PipelineResult<()> {
        let stored: serde_json::Value = self.load_config(name)?;
        // through text, so floats are parsed the same way on both sides
        let expected: serde_json::Value = serde_json::from_str(&serde_json::to_string(expected)?)?;
        if stored != expected {
            return Err(PipelineError::Config(format!(
                "checkpoints in '{}' were trained with {name} {stored}, but the current config gives {expected}",
                self.dir.display()
            )));
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::VolumeBatch;
    use crate::test_support::scratch_dir;
    use ndarray::Array2;

    /// Persists a single number as its "weights"
    struct Counter {
        value: usize,
    }

    impl VolumeClassifier for Counter {
        fn architecture(&self) -> &str { "counter" }
        fn num_classes(&self) -> usize { 2 }
        fn train_step(&mut self, _: &VolumeBatch, _: f64) -> PipelineResult<f64> {
            self.value += 1;
            Ok(0.0)
        }
        fn predict(&self, b: &VolumeBatch) -> PipelineResult<Array2<f32>> {
            Ok(Array2::zeros((b.len(), 2)))
        }
        fn features(&self, b: &VolumeBatch) -> PipelineResult<Array2<f32>> {
            Ok(Array2::zeros((b.len(), 1)))
        }
        fn save(&self, path: &Path) -> PipelineResult<()> {
            fs::write(path.with_extension("txt"), self.value.to_string())?;
            Ok(())
        }
        fn load(&mut self, path: &Path) -> PipelineResult<()> {
            let s = fs::read_to_string(path.with_extension("txt"))?;
            self.value = s.parse().map_err(|_| PipelineError::Checkpoint(s))?;
            Ok(())
        }
    }

    #[test]
    fn test_fold_layout() {
        let out = scratch_dir("ckpt_layout");
        let mgr = CheckpointManager::for_fold(&out, "resnet3d", 2).unwrap();
        assert_eq!(mgr.dir(), out.join("checkpoints").join("resnet3d").join("fold_2"));
        assert!(mgr.dir().is_dir());
        assert!(!mgr.has_best());
    }

    #[test]
    fn test_best_is_overwritten_and_restored() {
        let mgr = CheckpointManager::new(scratch_dir("ckpt_best")).unwrap();
        let mut model = Counter { value: 3 };
        mgr.save_best(&model, 1, "val_loss", 0.9).unwrap();
        model.value = 8;
        mgr.save_best(&model, 4, "val_loss", 0.5).unwrap();
        model.value = 11;

        let best = mgr.load_best(&mut model).unwrap();
        assert_eq!(best, BestCheckpoint { epoch: 4, monitor: "val_loss".into(), score: 0.5 });
        assert_eq!(model.value, 8);
    }

    #[test]
    fn test_missing_best_is_a_checkpoint_error() {
        let mgr = CheckpointManager::new(scratch_dir("ckpt_missing")).unwrap();
        assert!(matches!(mgr.best(), Err(PipelineError::Checkpoint(_))));
    }

    #[test]
    fn test_config_round_trip() {
        let mgr = CheckpointManager::new(scratch_dir("ckpt_cfg")).unwrap();
        mgr.save_config("shape", &[32usize, 112, 112]).unwrap();
        let shape: [usize; 3] = mgr.load_config("shape").unwrap();
        assert_eq!(shape, [32, 112, 112]);
    }

    #[test]
    fn test_check_config_detects_changes() {
        let mgr = CheckpointManager::new(scratch_dir("ckpt_check")).unwrap();
        assert!(matches!(
            mgr.check_config(NETWORK_SNAPSHOT, &[16usize]),
            Err(PipelineError::Checkpoint(_))
        ));

        mgr.save_config(NETWORK_SNAPSHOT, &[16usize]).unwrap();
        assert!(mgr.dir().join("network.json").is_file());
        mgr.check_config(NETWORK_SNAPSHOT, &[16usize]).unwrap();
        assert!(matches!(
            mgr.check_config(NETWORK_SNAPSHOT, &[32usize]),
            Err(PipelineError::Config(_))
        ));
    }
}
