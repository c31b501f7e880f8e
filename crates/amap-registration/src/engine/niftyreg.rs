use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use super::{
    AffineRequest, EngineOutcome, FreeformRequest, InvertAffineRequest, RegistrationEngine,
    ResampleRequest,
};
use crate::error::{RegistrationError, Result};
use crate::paths::LogPaths;

/// `[engine]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Folder holding the engine programs; `None` searches `PATH`.
    pub binaries_folder: Option<PathBuf>,
    pub affine_program: String,
    pub freeform_program: String,
    pub resample_program: String,
    pub transform_program: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binaries_folder: None,
            affine_program: "reg_aladin".to_string(),
            freeform_program: "reg_f3d".to_string(),
            resample_program: "reg_resample".to_string(),
            transform_program: "reg_transform".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_binaries_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.binaries_folder = Some(folder.into());
        self
    }

    /// Full path of a program, or its bare name when no folder is set.
    pub fn program(&self, name: &str) -> PathBuf {
        match &self.binaries_folder {
            Some(folder) => folder.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// NiftyReg command line tools run as child processes.
///
/// Standard output goes to the request's `.log` file and standard error to
/// its `.err` file.
#[derive(Debug, Clone, Default)]
pub struct NiftyReg {
    config: EngineConfig,
}

impl NiftyReg {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn run(&self, program: &str, args: Vec<OsString>, logs: &LogPaths) -> Result<EngineOutcome> {
        let program = self.config.program(program);
        tracing::debug!(
            program = %program.display(),
            args = ?args,
            "Starting engine"
        );
        let stdout = create_log(&logs.log)?;
        let stderr = create_log(&logs.err)?;
        let status = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| RegistrationError::EngineUnavailable {
                program: program.clone(),
                source,
            })?;
        Ok(EngineOutcome::new(status.code(), logs))
    }
}

fn create_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

fn args(flags: impl IntoIterator<Item = String>, paths: &[(&str, &Path)]) -> Vec<OsString> {
    let mut args: Vec<OsString> = flags.into_iter().map(OsString::from).collect();
    for (flag, path) in paths {
        args.push(OsString::from(*flag));
        args.push(path.as_os_str().to_owned());
    }
    args
}

impl RegistrationEngine for NiftyReg {
    fn name(&self) -> &str {
        "niftyreg"
    }

    fn run_affine(&self, request: &AffineRequest) -> Result<EngineOutcome> {
        let args = args(
            request.flags.to_args(),
            &[
                ("-flo", request.floating.as_path()),
                ("-ref", request.reference.as_path()),
                ("-aff", request.matrix.as_path()),
                ("-res", request.result.as_path()),
            ],
        );
        self.run(&self.config.affine_program, args, &request.logs)
    }

    fn run_freeform(&self, request: &FreeformRequest) -> Result<EngineOutcome> {
        let args = args(
            request.flags.to_args(),
            &[
                ("-aff", request.initial_affine.as_path()),
                ("-flo", request.floating.as_path()),
                ("-ref", request.reference.as_path()),
                ("-cpp", request.control_points.as_path()),
                ("-res", request.result.as_path()),
            ],
        );
        self.run(&self.config.freeform_program, args, &request.logs)
    }

    fn run_resample(&self, request: &ResampleRequest) -> Result<EngineOutcome> {
        let args = args(
            request.flags.to_args(),
            &[
                ("-cpp", request.control_points.as_path()),
                ("-flo", request.floating.as_path()),
                ("-ref", request.reference.as_path()),
                ("-res", request.result.as_path()),
            ],
        );
        self.run(&self.config.resample_program, args, &request.logs)
    }

    fn invert_affine(&self, request: &InvertAffineRequest) -> Result<EngineOutcome> {
        let args = vec![
            OsString::from("-invAff"),
            request.matrix.as_os_str().to_owned(),
            request.inverse.as_os_str().to_owned(),
        ];
        self.run(&self.config.transform_program, args, &request.logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EngineFlags;

    #[test]
    fn test_program_resolution() {
        let config = EngineConfig::default();
        assert_eq!(config.program("reg_f3d"), PathBuf::from("reg_f3d"));
        let config = config.with_binaries_folder("/opt/niftyreg/bin");
        assert_eq!(config.program("reg_f3d"), PathBuf::from("/opt/niftyreg/bin/reg_f3d"));
    }

    #[test]
    fn test_argument_order() {
        let flags = EngineFlags::new().with("-ln", 6u32).with("-lp", 5u32);
        let built = args(
            flags.to_args(),
            &[("-flo", Path::new("brain.nii")), ("-ref", Path::new("sample.nii"))],
        );
        let built: Vec<String> = built.into_iter().map(|a| a.into_string().unwrap()).collect();
        assert_eq!(built, vec!["-ln", "6", "-lp", "5", "-flo", "brain.nii", "-ref", "sample.nii"]);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = NiftyReg::new(EngineConfig::default().with_binaries_folder(dir.path()));
        let logs = LogPaths {
            log: dir.path().join("a.log"),
            err: dir.path().join("a.err"),
        };
        let request = InvertAffineRequest {
            matrix: dir.path().join("m.txt"),
            inverse: dir.path().join("i.txt"),
            logs,
        };
        assert!(matches!(
            engine.invert_affine(&request),
            Err(RegistrationError::EngineUnavailable { .. })
        ));
    }
}
