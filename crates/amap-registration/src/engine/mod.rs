//! The external registration engine.
//!
//! The pipeline never computes a registration itself. Each engine stage is
//! described by a request naming its inputs, flags and outputs; an engine
//! runs it and reports how it exited. Checking that the outputs appeared is
//! left to the caller.

mod niftyreg;
mod replay;

use std::fmt;
use std::path::PathBuf;

pub use niftyreg::{EngineConfig, NiftyReg};
pub use replay::{CallKind, ReplayCall, ReplayEngine};

use crate::error::Result;
use crate::params::EngineFlags;
use crate::paths::LogPaths;

/// Global affine alignment of `floating` onto `reference`.
#[derive(Debug, Clone)]
pub struct AffineRequest {
    pub reference: PathBuf,
    pub floating: PathBuf,
    pub flags: EngineFlags,
    pub matrix: PathBuf,
    pub result: PathBuf,
    pub logs: LogPaths,
}

/// Free-form (control point) alignment starting from an affine.
#[derive(Debug, Clone)]
pub struct FreeformRequest {
    pub reference: PathBuf,
    pub floating: PathBuf,
    pub initial_affine: PathBuf,
    pub flags: EngineFlags,
    pub control_points: PathBuf,
    pub result: PathBuf,
    pub logs: LogPaths,
}

/// Resampling of `floating` into `reference` space through control points.
#[derive(Debug, Clone)]
pub struct ResampleRequest {
    pub reference: PathBuf,
    pub floating: PathBuf,
    pub control_points: PathBuf,
    pub flags: EngineFlags,
    pub result: PathBuf,
    pub logs: LogPaths,
}

/// Inversion of an affine matrix file.
#[derive(Debug, Clone)]
pub struct InvertAffineRequest {
    pub matrix: PathBuf,
    pub inverse: PathBuf,
    pub logs: LogPaths,
}

/// How an engine invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub log: PathBuf,
    pub err: PathBuf,
}

impl EngineOutcome {
    pub fn new(code: Option<i32>, logs: &LogPaths) -> Self {
        Self {
            code,
            log: logs.log.clone(),
            err: logs.err.clone(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human readable exit status.
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

impl fmt::Display for EngineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status())
    }
}

/// An external registration toolkit.
///
/// `Err` is reserved for failures to start the engine at all; an engine
/// that ran and failed reports it through [`EngineOutcome`].
pub trait RegistrationEngine {
    fn name(&self) -> &str;

    fn run_affine(&self, request: &AffineRequest) -> Result<EngineOutcome>;

    fn run_freeform(&self, request: &FreeformRequest) -> Result<EngineOutcome>;

    fn run_resample(&self, request: &ResampleRequest) -> Result<EngineOutcome>;

    fn invert_affine(&self, request: &InvertAffineRequest) -> Result<EngineOutcome>;
}
