//! Serializable model state

use crate::model::{Param, Parameterized};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model metadata stored alongside the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Run name the checkpoint belongs to
    pub name: String,

    /// Model type identifier (e.g. "lmkt", "dkt")
    pub architecture: String,

    pub saved_at: DateTime<Utc>,

    /// Epoch and validation loss at save time, plus anything else worth keeping
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            saved_at: Utc::now(),
            custom: HashMap::new(),
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Information about a model parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name (e.g., "layers.0.lora_a", "out.bias")
    pub name: String,

    pub shape: Vec<usize>,
}

/// Trainable parameters of a model, flattened in `named_parameters` order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,

    pub parameters: Vec<ParameterInfo>,

    /// Flattened parameter data
    pub data: Vec<f32>,
}

impl ModelState {
    /// Snapshot the trainable parameters of `model`
    pub fn capture<M: Parameterized + ?Sized>(model: &M, metadata: ModelMetadata) -> Self {
        let mut data = Vec::new();
        let parameters = model
            .named_parameters()
            .into_iter()
            .map(|(name, param)| {
                data.extend(param.data().iter().copied());
                ParameterInfo { name, shape: param.shape().to_vec() }
            })
            .collect();
        Self { metadata, parameters, data }
    }

    /// Split the flat buffer back into named parameters
    pub fn into_params(self) -> Result<Vec<(String, Param)>> {
        let mut offset = 0;
        let mut params = Vec::with_capacity(self.parameters.len());
        for info in self.parameters {
            let size: usize = info.shape.iter().product();
            let end = offset + size;
            let values = self.data.get(offset..end).ok_or_else(|| {
                Error::Checkpoint(format!(
                    "parameter '{}' runs past the end of the stored data ({} > {})",
                    info.name,
                    end,
                    self.data.len()
                ))
            })?;
            params.push((info.name, Param::new(values.to_vec(), info.shape)));
            offset = end;
        }
        Ok(params)
    }

    /// Overwrite the parameters of `model` by name
    ///
    /// Every model parameter must be present in the checkpoint with the same shape, and every
    /// stored parameter must exist in the model. Nothing is written unless all of them match.
    pub fn restore_into<M: Parameterized + ?Sized>(self, model: &mut M) -> Result<()> {
        let mut stored: HashMap<String, Param> = self.into_params()?.into_iter().collect();
        let mut targets = Vec::new();
        for (name, param) in model.named_parameters_mut() {
            let saved = stored
                .remove(&name)
                .ok_or_else(|| Error::Checkpoint(format!("missing parameter '{name}'")))?;
            if saved.shape() != param.shape() {
                return Err(Error::Checkpoint(format!(
                    "parameter '{name}' has shape {:?}, expected {:?}",
                    saved.shape(),
                    param.shape()
                )));
            }
            targets.push((param, saved));
        }
        if let Some(name) = stored.keys().next() {
            return Err(Error::Checkpoint(format!("unexpected parameter '{name}'")));
        }

        for (param, saved) in targets {
            let shape = saved.shape().to_vec();
            param.assign(saved.data().clone(), shape);
        }
        Ok(())
    }
}
