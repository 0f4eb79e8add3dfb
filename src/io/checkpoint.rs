//! Best-model checkpoints on disk

use super::model::{ModelMetadata, ModelState};
use crate::model::Parameterized;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of language-model adapter weights inside the checkpoint directory
pub const ADAPTER_FILE: &str = "adapter_model.json";

/// How a checkpoint is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointLayout {
    /// `{dir}/{name}/adapter_model.json`
    Adapter,
    /// `{dir}/{name}.json`
    SingleFile,
}

pub fn checkpoint_path(dir: &Path, name: &str, layout: CheckpointLayout) -> PathBuf {
    match layout {
        CheckpointLayout::Adapter => dir.join(name).join(ADAPTER_FILE),
        CheckpointLayout::SingleFile => dir.join(format!("{name}.json")),
    }
}

/// Write the trainable parameters of `model` to `path`, replacing any previous save
pub fn save_checkpoint<M: Parameterized + ?Sized>(
    model: &M,
    metadata: ModelMetadata,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let state = ModelState::capture(model, metadata);
    fs::write(path, serde_json::to_string(&state)?)?;
    debug!(path = %path.display(), params = state.parameters.len(), "saved checkpoint");
    Ok(())
}

pub fn load_model_state(path: &Path) -> Result<ModelState> {
    let content = fs::read_to_string(path).map_err(|e| {
        crate::Error::Checkpoint(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a saved checkpoint into a freshly built model
pub fn load_checkpoint<M: Parameterized + ?Sized>(
    model: &mut M,
    path: &Path,
) -> Result<ModelMetadata> {
    let state = load_model_state(path)?;
    let metadata = state.metadata.clone();
    state.restore_into(model)?;
    debug!(path = %path.display(), "loaded checkpoint");
    Ok(metadata)
}
