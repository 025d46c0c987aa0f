// ============================================================
// Layer 6: FastSurfer Runner
// ============================================================
// Segments one T1 volume by running FastSurfer as a subprocess:
//
//   <command...> --t1 <input> --sid <subject> --sd <subjects_dir>
//                [--seg_only] [--device <dev>] [extra args...]
//
// `command` is the launcher, e.g. ["run_fastsurfer.sh"] or a
// container invocation such as ["docker", "run", ..., "fastsurfer"].
//
// A run counts as successful only when the process exits with
// status 0 AND the documented segmentation file exists:
//
//   <subjects_dir>/<subject>/mri/aparc.DKTatlas+aseg.deep.mgz
//
// Failures map to PipelineError::ExternalTool and are never retried.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

const TOOL: &str = "FastSurfer";

/// Relative to the subject directory
pub const SEGMENTATION_FILE: &str = "mri/aparc.DKTatlas+aseg.deep.mgz";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastSurferConfig {
    /// Program and leading arguments
    pub command:      Vec<String>,
    /// Passed as --sd; one sub-folder per subject is created inside
    pub subjects_dir: PathBuf,
    /// Skip surface reconstruction
    pub seg_only:     bool,
    /// e.g. "cpu", "cuda"; FastSurfer picks one when unset
    pub device:       Option<String>,
    pub extra_args:   Vec<String>,
}

impl Default for FastSurferConfig {
    fn default() -> Self {
        Self {
            command:      vec!["run_fastsurfer.sh".to_string()],
            subjects_dir: PathBuf::from("fastsurfer"),
            seg_only:     true,
            device:       None,
            extra_args:   Vec::new(),
        }
    }
}

impl FastSurferConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(PipelineError::Config("fastsurfer.command must name a program".into()));
        }
        Ok(())
    }
}

pub struct FastSurferRunner {
    config: FastSurferConfig,
}

impl FastSurferRunner {
    pub fn new(config: FastSurferConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Arguments after the program name, in invocation order
    pub fn arguments(&self, input: &Path, subject: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.command.iter().skip(1).map(OsString::from).collect();
        args.push("--t1".into());
        args.push(input.as_os_str().to_owned());
        args.push("--sid".into());
        args.push(subject.into());
        args.push("--sd".into());
        args.push(self.config.subjects_dir.as_os_str().to_owned());
        if self.config.seg_only {
            args.push("--seg_only".into());
        }
        if let Some(device) = &self.config.device {
            args.push("--device".into());
            args.push(device.into());
        }
        args.extend(self.config.extra_args.iter().map(OsString::from));
        args
    }

    /// Where the segmentation of `subject` is expected to appear
    pub fn output_path(&self, subject: &str) -> PathBuf {
        self.config.subjects_dir.join(subject).join(SEGMENTATION_FILE)
    }

    /// Run FastSurfer on `input` and return the segmentation path
    pub fn segment(&self, input: &Path, subject: &str) -> PipelineResult<PathBuf> {
        let program = &self.config.command[0];
        let args = self.arguments(input, subject);
        tracing::info!("Running {TOOL} for '{subject}'");
        tracing::debug!("{program} {:?}", args);

        let output = Command::new(program).args(&args).output().map_err(|e| PipelineError::ExternalTool {
            tool:   TOOL.to_string(),
            status: "not started".to_string(),
            stderr: format!("cannot launch '{program}': {e}"),
        })?;

        if !output.status.success() {
            return Err(PipelineError::ExternalTool {
                tool:   TOOL.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let segmentation = self.output_path(subject);
        if !segmentation.is_file() {
            return Err(PipelineError::ExternalTool {
                tool:   TOOL.to_string(),
                status: output.status.to_string(),
                stderr: format!("expected output '{}' was not produced", segmentation.display()),
            });
        }
        tracing::debug!("Segmentation for '{subject}': '{}'", segmentation.display());
        Ok(segmentation)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;
    use std::fs;

    fn runner(command: Vec<String>, subjects_dir: PathBuf) -> FastSurferRunner {
        FastSurferRunner::new(FastSurferConfig { command, subjects_dir, ..FastSurferConfig::default() }).unwrap()
    }

    #[test]
    fn test_argument_layout() {
        let r = FastSurferRunner::new(FastSurferConfig {
            command: vec!["docker".into(), "run".into(), "fs".into()],
            subjects_dir: PathBuf::from("/out"),
            seg_only: true,
            device: Some("cpu".into()),
            extra_args: vec!["--threads".into(), "4".into()],
        })
        .unwrap();
        let args: Vec<String> = r
            .arguments(Path::new("/in/sub-01.nii.gz"), "sub-01")
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "run", "fs", "--t1", "/in/sub-01.nii.gz", "--sid", "sub-01", "--sd", "/out",
                "--seg_only", "--device", "cpu", "--threads", "4",
            ]
        );
        assert_eq!(
            r.output_path("sub-01"),
            PathBuf::from("/out/sub-01/mri/aparc.DKTatlas+aseg.deep.mgz")
        );
    }

    #[test]
    fn test_empty_command_is_a_config_error() {
        let cfg = FastSurferConfig { command: vec![], ..FastSurferConfig::default() };
        assert!(matches!(FastSurferRunner::new(cfg), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_missing_program_is_an_external_tool_error() {
        let dir = scratch_dir("fastsurfer_missing");
        let r = runner(vec!["/nonexistent/run_fastsurfer.sh".into()], dir.clone());
        let err = r.segment(&dir.join("t1.nii"), "s1").unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool { ref status, .. } if status == "not started"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_carries_stderr() {
        let dir = scratch_dir("fastsurfer_fail");
        let script = dir.join("fail.sh");
        fs::write(&script, "echo 'no GPU found' >&2\nexit 3\n").unwrap();
        let r = runner(vec!["sh".into(), script.to_string_lossy().into_owned()], dir.clone());

        match r.segment(&dir.join("t1.nii"), "s1") {
            Err(PipelineError::ExternalTool { stderr, status, .. }) => {
                assert_eq!(stderr, "no GPU found");
                assert!(status.contains('3'));
            }
            other => panic!("expected ExternalTool, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_success_requires_the_segmentation_file() {
        let dir = scratch_dir("fastsurfer_ok");
        // $4 = subject, $6 = subjects dir
        let writes = dir.join("writes.sh");
        fs::write(&writes, "mkdir -p \"$6/$4/mri\" && touch \"$6/$4/mri/aparc.DKTatlas+aseg.deep.mgz\"\n").unwrap();
        let silent = dir.join("silent.sh");
        fs::write(&silent, "exit 0\n").unwrap();

        let sd = dir.join("subjects");
        let ok = runner(vec!["sh".into(), writes.to_string_lossy().into_owned()], sd.clone());
        let path = ok.segment(&dir.join("t1.nii"), "s1").unwrap();
        assert_eq!(path, sd.join("s1").join(SEGMENTATION_FILE));

        let quiet = runner(vec!["sh".into(), silent.to_string_lossy().into_owned()], sd);
        assert!(matches!(
            quiet.segment(&dir.join("t1.nii"), "s2"),
            Err(PipelineError::ExternalTool { .. })
        ));
    }
}
