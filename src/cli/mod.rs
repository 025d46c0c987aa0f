// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// The entry point for all user interaction. Parses arguments
// with clap, hands the resolved config to a Layer 2 use case and
// prints the human-readable summary. Nothing else prints.
//
// Commands:
//   1. `train`   → k-fold cross-validation of one architecture
//   2. `extract` → classical classifiers on the trained folds
//   3. `segment` → FastSurfer over the raw scans
//   4. `compare` → thresholded difference of two scans
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CompareArgs, Commands, ExperimentArgs};

use crate::application::{
    compare_use_case::CompareUseCase,
    cross_validate_use_case::CrossValidateUseCase,
    feature_use_case::FeatureUseCase,
    segment_use_case::SegmentUseCase,
};
use crate::infra::report::{format_params, mean_std};

#[derive(Parser, Debug)]
#[command(
    name = "mri-classify",
    version,
    about = "Cross-validated CN / MCI / AD classification of 3D brain MRI."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Extract(args) => run_extract(args),
            Commands::Segment(args) => run_segment(args),
            Commands::Compare(args) => run_compare(args),
        }
    }
}

fn run_train(args: ExperimentArgs) -> Result<()> {
    let config = args.resolve()?;
    let output = config.output_dir.clone();
    let report = CrossValidateUseCase::new(config).execute()?;

    println!("\n{}", report.render());
    println!("Results written to '{}'", output.display());
    Ok(())
}

fn run_extract(args: ExperimentArgs) -> Result<()> {
    let config = args.resolve()?;
    let kinds = config.features.classifiers.clone();
    let results = FeatureUseCase::new(config).execute()?;

    println!("\n{:<22} {:>18} {:>18}", "classifier", "val accuracy", "val macro F1");
    for kind in kinds {
        let rows: Vec<_> = results.iter().filter(|r| r.kind == kind).collect();
        let acc: Vec<f64> = rows.iter().map(|r| r.val_accuracy).collect();
        let f1: Vec<f64> = rows.iter().map(|r| r.val_macro_f1).collect();
        if let (Some(a), Some(f)) = (mean_std(&acc), mean_std(&f1)) {
            println!(
                "{:<22} {:>9.4} ± {:<6.4} {:>9.4} ± {:<6.4}",
                kind.name(), a.mean, a.std, f.mean, f.std
            );
        }
        for r in rows {
            println!("    fold {}: {}", r.fold, format_params(&r.best_params));
        }
    }
    Ok(())
}

fn run_segment(args: ExperimentArgs) -> Result<()> {
    let config = args.resolve()?;
    let summary = SegmentUseCase::new(config).execute()?;

    println!(
        "Segmented {} subjects ({} already done, {} failed)",
        summary.segmented.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    for (subject, reason) in &summary.failed {
        println!("  {subject}: {reason}");
    }
    Ok(())
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let stats = CompareUseCase::new(args.first, args.second, args.output_dir.clone()).execute()?;

    if stats.resampled {
        println!("Second volume resampled to {:?}", stats.shape);
    }
    println!("mean |diff|   {:.4}", stats.mean_abs);
    println!("std  |diff|   {:.4}", stats.std_abs);
    println!("threshold     {:.4}", stats.threshold);
    println!("kept voxels   {}", stats.kept_voxels);
    println!("range         [{:.4}, {:.4}]", stats.max_decrease, stats.max_increase);
    println!("Results written to '{}'", args.output_dir.display());
    Ok(())
}
