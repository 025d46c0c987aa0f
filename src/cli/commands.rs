// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Subcommands: `train`, `extract`, `segment` and `compare`.
//
// Everything about an experiment lives in the JSON config file;
// the flags below only override the few values that change most
// between runs. `compare` works on two files and needs no config.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::application::config::ExperimentConfig;
use crate::ml::architectures::Architecture;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cross-validate a 3D CNN on the class-folder dataset
    Train(ExperimentArgs),

    /// Fit classical classifiers on features of the trained folds
    Extract(ExperimentArgs),

    /// Run FastSurfer on every volume in the dataset
    Segment(ExperimentArgs),

    /// Thresholded voxel-wise difference of two scans
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Reference volume; the other one is resampled to its shape
    #[arg(long)]
    pub first: PathBuf,

    #[arg(long)]
    pub second: PathBuf,

    /// Where difference.nii, summary.json and the slice CSVs go
    #[arg(long, default_value = "comparison")]
    pub output_dir: PathBuf,
}

/// Flags shared by every subcommand
#[derive(Args, Debug)]
pub struct ExperimentArgs {
    /// Experiment config (JSON). Defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Folder with one sub-folder per class
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Where checkpoints, metrics and reports are written
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// basic_cnn, densenet3d, inception3d, resnet3d or r2plus1d
    #[arg(long)]
    pub architecture: Option<Architecture>,
}

impl ExperimentArgs {
    /// Load the config file (if any), then apply the flag overrides.
    pub fn resolve(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(root) = &self.data_root {
            config.data_root = root.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(arch) = self.architecture {
            config.architecture = arch;
        }
        config.validate().context("Invalid experiment configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_overrides_replace_defaults() {
        let cli = Cli::try_parse_from([
            "mri-classify", "train", "--architecture", "R(2+1)D", "--output-dir", "/tmp/runs",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = args.resolve().unwrap();
        assert_eq!(cfg.architecture, Architecture::R2Plus1d);
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(cfg.folds, ExperimentConfig::default().folds);
    }

    #[test]
    fn test_unknown_architecture_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["mri-classify", "extract", "--architecture", "vgg16"]).is_err());
    }

    #[test]
    fn test_compare_needs_both_volumes() {
        let cli = Cli::try_parse_from(["mri-classify", "compare", "--first", "a.nii", "--second", "b.nii.gz"]).unwrap();
        let Commands::Compare(args) = cli.command else { panic!("expected compare") };
        assert_eq!(args.second, PathBuf::from("b.nii.gz"));
        assert_eq!(args.output_dir, PathBuf::from("comparison"));

        assert!(Cli::try_parse_from(["mri-classify", "compare", "--first", "a.nii"]).is_err());
    }
}
