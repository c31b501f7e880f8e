//! Resumable registration of a reference atlas onto a sample brain.
//!
//! The sample is downsampled to the atlas resolution, the atlas is brought
//! into the sample's orientation, and an external engine computes the
//! affine and free-form transforms. Each stage writes a named artifact in
//! the output directory and is skipped when that artifact already exists.

pub mod atlas;
pub mod brain;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod gate;
pub mod params;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod validation;
pub mod volumes;

pub use atlas::AtlasModel;
pub use brain::BrainProcessor;
pub use config::{AmapConfig, CONFIG_ENV_VAR};
pub use driver::RegistrationDriver;
pub use engine::{CallKind, EngineConfig, NiftyReg, RegistrationEngine, ReplayEngine};
pub use error::{RegistrationError, Result};
pub use gate::{pending_stages, ArtifactProbe, FsProbe, GateOptions, SetProbe, StageGate, StageId};
pub use params::{EngineFlags, FlagValue, RegistrationParameters};
pub use paths::{LogPaths, OutputPaths};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport};
pub use progress::{HistoryCallback, LoggingCallback, StageCallback, StageEvent, StageTracker};
pub use volumes::VolumeAggregator;
