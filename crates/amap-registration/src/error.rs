//! Error types for the registration pipeline.

use std::path::PathBuf;

use amap_core::CoreError;
use thiserror::Error;

use crate::gate::StageId;

/// Main error type for registration runs.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Geometry or filter error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A configured atlas file is not on disk.
    #[error("Atlas file not found: {0}")]
    MissingAtlasFile(PathBuf),

    /// The sample could not be found or read.
    #[error("Sample input unavailable: {0}")]
    MissingInput(String),

    /// Persisting was requested without a destination.
    #[error("No destination defined for atlas copies")]
    DestinationUndefined,

    /// Atlas volumes were used before `load`.
    #[error("Atlas volumes have not been loaded")]
    AtlasNotLoaded,

    /// Engine parameter out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The engine exited unsuccessfully or did not produce its output.
    #[error(
        "{stage} failed ({status}); see log {} and errors {}",
        log.display(),
        err.display()
    )]
    EngineFailure {
        stage: StageId,
        status: String,
        log: PathBuf,
        err: PathBuf,
    },

    /// An engine program could not be started.
    #[error("Cannot start {program}: {source}")]
    EngineUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage input produced by an earlier stage is absent.
    #[error("{stage} needs {} which does not exist", path.display())]
    MissingArtifact { stage: StageId, path: PathBuf },

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Reading or writing a volume or table failed.
    #[error("{0:#}")]
    VolumeIo(anyhow::Error),
}

impl From<anyhow::Error> for RegistrationError {
    fn from(err: anyhow::Error) -> Self {
        Self::VolumeIo(err)
    }
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a missing input error.
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Create an engine failure.
    pub fn engine_failure(
        stage: StageId,
        status: impl Into<String>,
        log: impl Into<PathBuf>,
        err: impl Into<PathBuf>,
    ) -> Self {
        Self::EngineFailure {
            stage,
            status: status.into(),
            log: log.into(),
            err: err.into(),
        }
    }

    /// Create a missing artifact error.
    pub fn missing_artifact(stage: StageId, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            stage,
            path: path.into(),
        }
    }
}
