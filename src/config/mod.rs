//! Run configuration
//!
//! Options come from an optional YAML file overlaid with command-line flags and are
//! resolved once into an immutable [`RunConfig`].

mod loader;
mod model_type;
mod run;

pub use loader::{load_config, load_run_args};
pub use model_type::{ModelFamily, ModelType};
pub use run::{FamilyDefaults, OptimizerKind, RunArgs, RunConfig, DEFAULT_BASE_MODEL};
