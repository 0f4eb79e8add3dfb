//! YAML run-configuration loading

use super::run::{RunArgs, RunConfig};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Load partial run arguments from a YAML file
pub fn load_run_args<P: AsRef<Path>>(path: P) -> Result<RunArgs> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    Ok(serde_yaml::from_str(&yaml)?)
}

/// Load a YAML file (if any), overlay command-line arguments and resolve defaults
pub fn load_config(path: Option<&Path>, overrides: RunArgs) -> Result<RunConfig> {
    let base = match path {
        Some(path) => load_run_args(path)?,
        None => RunArgs::default(),
    };
    RunConfig::resolve(base.merge(overrides))
}
