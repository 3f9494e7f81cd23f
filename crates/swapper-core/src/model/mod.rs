// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Anomaly models hosted by the runner.
//!
//! The runner only sees [`AnomalyModel`] and [`ModelFactory`]; model kinds are
//! selected by the factory from the stored [`ModelDefinition`].

pub mod schema;
pub mod zscore;

pub use schema::{FieldMeta, FieldType, ModelRecord, RowConverter};
pub use zscore::{BuiltinModelFactory, ZScoreModel};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while building, running or snapshotting a model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The input row does not fit the schema or the model.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model configuration names a model kind the factory cannot build.
    #[error("unsupported model type: {0}")]
    UnsupportedModel(String),

    /// The definition is inconsistent.
    #[error("invalid model definition: {0}")]
    Definition(String),

    /// Snapshot could not be written or read.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Immutable model definition stored by `defineModel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub model_config: Value,
    #[serde(default)]
    pub inference_args: Value,
    #[serde(rename = "inputRecordSchema")]
    pub input_schema: Vec<FieldMeta>,
}

impl ModelDefinition {
    /// Parse `defineModel` command arguments.
    pub fn from_args(args: &Map<String, Value>) -> Result<Self, ModelError> {
        let definition: Self = serde_json::from_value(Value::Object(args.clone()))
            .map_err(|e| ModelError::Definition(e.to_string()))?;
        if !definition.model_config.is_object() {
            return Err(ModelError::Definition(
                "modelConfig must be an object".to_string(),
            ));
        }
        if definition.input_schema.is_empty() {
            return Err(ModelError::Definition(
                "inputRecordSchema must not be empty".to_string(),
            ));
        }
        Ok(definition)
    }
}

/// A streaming anomaly model.
pub trait AnomalyModel: Send {
    /// Feed one record and return its anomaly score.
    fn run(&mut self, record: &ModelRecord) -> Result<f64, ModelError>;

    /// Serialize the full model state.
    fn snapshot(&self) -> Result<Vec<u8>, ModelError>;
}

/// Builds models from definitions and snapshots.
pub trait ModelFactory: Send + Sync {
    /// Build a fresh model.
    fn create(&self, definition: &ModelDefinition) -> Result<Box<dyn AnomalyModel>, ModelError>;

    /// Rebuild a model from a snapshot written by [`AnomalyModel::snapshot`].
    fn restore(
        &self,
        definition: &ModelDefinition,
        snapshot: &[u8],
    ) -> Result<Box<dyn AnomalyModel>, ModelError>;
}
