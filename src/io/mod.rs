//! Checkpoint persistence

mod checkpoint;
mod model;

pub use checkpoint::{
    checkpoint_path, load_checkpoint, load_model_state, save_checkpoint, CheckpointLayout,
    ADAPTER_FILE,
};
pub use model::{ModelMetadata, ModelState, ParameterInfo};
