//! Run configuration loaded from TOML.
//!
//! ```toml
//! [atlas]
//! base_folder = "~/.amap/atlas/allen_10um"
//! atlas_name = "annotations.nii"
//! brain_name = "brain.nii"
//! hemispheres_name = "hemispheres.nii"
//! structures_name = "structures.csv"
//! left_hemisphere_value = 2
//! right_hemisphere_value = 1
//! orientation = "horizontal"
//! pixel_size = { x = 10.0, y = 10.0, z = 10.0 }
//!
//! [engine]
//! binaries_folder = "/opt/niftyreg/bin"
//!
//! [registration]
//! bending_energy_weight = 0.95
//! ```
//!
//! `[engine]` and `[registration]` are optional and fall back to defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use amap_core::AtlasConfig;
use serde::Deserialize;

use crate::engine::EngineConfig;
use crate::error::{RegistrationError, Result};
use crate::params::RegistrationParameters;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "AMAP_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AmapConfig {
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registration: RegistrationParameters,
}

impl AmapConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AmapConfig = toml::from_str(content)
            .map_err(|e| RegistrationError::invalid_configuration(e.to_string()))?;
        config.atlas.native_orientation()?;
        Ok(config)
    }

    /// Load from `path`, or from the file named by `AMAP_CONFIG_PATH`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config_file()?,
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            RegistrationError::invalid_configuration(format!(
                "Cannot read configuration {}: {e}",
                path.display()
            ))
        })?;
        tracing::debug!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&content)
    }
}

fn find_config_file() -> Result<PathBuf> {
    match env::var_os(CONFIG_ENV_VAR) {
        Some(path) => Ok(PathBuf::from(path)),
        None => Err(RegistrationError::invalid_configuration(format!(
            "No configuration file given and {CONFIG_ENV_VAR} is not set"
        ))),
    }
}
