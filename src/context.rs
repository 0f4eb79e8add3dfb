//! Explicit execution context threaded through every entry point

use crate::data::DataSource;
use crate::model::{BaselineModelFactory, Device, LanguageModelLoader};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 221;

/// Collaborators and output locations shared by a train/test run
pub struct ExecutionContext<'a> {
    pub device: Device,
    pub results_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    /// Seeds batch shuffling and the random policy
    pub seed: u64,
    pub data: &'a dyn DataSource,
    pub lm_loader: Option<&'a dyn LanguageModelLoader>,
    pub baseline_factory: Option<&'a dyn BaselineModelFactory>,
}

impl<'a> ExecutionContext<'a> {
    /// Context with default directories (`results/`, `saved_models/`) and no model backends
    pub fn new(data: &'a dyn DataSource) -> Self {
        Self {
            device: Device::Cpu,
            results_dir: PathBuf::from("results"),
            checkpoint_dir: PathBuf::from("saved_models"),
            seed: DEFAULT_SEED,
            data,
            lm_loader: None,
            baseline_factory: None,
        }
    }

    pub fn with_dirs(mut self, results_dir: impl Into<PathBuf>, checkpoint_dir: impl Into<PathBuf>) -> Self {
        self.results_dir = results_dir.into();
        self.checkpoint_dir = checkpoint_dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_lm_loader(mut self, loader: &'a dyn LanguageModelLoader) -> Self {
        self.lm_loader = Some(loader);
        self
    }

    pub fn with_baseline_factory(mut self, factory: &'a dyn BaselineModelFactory) -> Self {
        self.baseline_factory = Some(factory);
        self
    }

    pub fn require_lm_loader(&self) -> Result<&'a dyn LanguageModelLoader> {
        self.lm_loader.ok_or(Error::MissingCollaborator("language model loader"))
    }

    pub fn require_baseline_factory(&self) -> Result<&'a dyn BaselineModelFactory> {
        self.baseline_factory.ok_or(Error::MissingCollaborator("baseline model factory"))
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}
