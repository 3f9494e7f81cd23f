// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Checkpoint store abstraction and backends.
//!
//! A model's persistent state is its immutable definition, an opaque snapshot
//! and a free-form JSON attribute object. The definition exists from
//! `defineModel` until `deleteModel`; the checkpoint row exists once the runner
//! has saved at least once.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryCheckpointStore;
pub use self::sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::ModelDefinition;

/// Errors from checkpoint store backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No definition or checkpoint exists for the model.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A different definition already exists for the model.
    #[error("model already exists: {0}")]
    ModelAlreadyExists(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON could not be (de)serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent storage for model definitions and checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a definition. An identical existing definition is accepted; a
    /// different one fails with [`StoreError::ModelAlreadyExists`].
    async fn define(&self, model_id: &str, definition: &ModelDefinition) -> Result<(), StoreError>;

    /// Load the definition.
    async fn load_model_definition(&self, model_id: &str) -> Result<ModelDefinition, StoreError>;

    /// Load the latest snapshot.
    async fn load(&self, model_id: &str) -> Result<Vec<u8>, StoreError>;

    /// Replace snapshot and attributes. Requires a definition.
    async fn save(&self, model_id: &str, snapshot: &[u8], attributes: &Value)
    -> Result<(), StoreError>;

    /// Load checkpoint attributes without the snapshot.
    async fn load_checkpoint_attributes(&self, model_id: &str) -> Result<Value, StoreError>;

    /// Replace the attributes of an existing checkpoint.
    async fn update_checkpoint_attributes(
        &self,
        model_id: &str,
        attributes: &Value,
    ) -> Result<(), StoreError>;

    /// Delete definition and checkpoint.
    async fn remove(&self, model_id: &str) -> Result<(), StoreError>;

    /// Copy definition and checkpoint (if any) of `source` to `dest`.
    async fn clone_model(&self, source: &str, dest: &str) -> Result<(), StoreError>;
}
