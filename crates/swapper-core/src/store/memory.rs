// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{CheckpointStore, StoreError};
use crate::model::ModelDefinition;

#[derive(Clone)]
struct StoredModel {
    definition: ModelDefinition,
    checkpoint: Option<(Vec<u8>, Value)>,
}

#[derive(Default)]
struct Inner {
    models: HashMap<String, StoredModel>,
    snapshot_writes: usize,
    attribute_writes: usize,
}

/// Checkpoint store kept in process memory, counting writes for tests.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<Inner>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full checkpoints written (`save`).
    pub async fn snapshot_writes(&self) -> usize {
        self.inner.lock().await.snapshot_writes
    }

    /// Number of attribute-only updates.
    pub async fn attribute_writes(&self) -> usize {
        self.inner.lock().await.attribute_writes
    }

    /// Whether a definition is stored for the model.
    pub async fn contains(&self, model_id: &str) -> bool {
        self.inner.lock().await.models.contains_key(model_id)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn define(&self, model_id: &str, definition: &ModelDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.models.get(model_id) {
            Some(existing) if existing.definition == *definition => Ok(()),
            Some(_) => Err(StoreError::ModelAlreadyExists(model_id.to_string())),
            None => {
                inner.models.insert(
                    model_id.to_string(),
                    StoredModel {
                        definition: definition.clone(),
                        checkpoint: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn load_model_definition(&self, model_id: &str) -> Result<ModelDefinition, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .models
            .get(model_id)
            .map(|m| m.definition.clone())
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))
    }

    async fn load(&self, model_id: &str) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .models
            .get(model_id)
            .and_then(|m| m.checkpoint.as_ref())
            .map(|(snapshot, _)| snapshot.clone())
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))
    }

    async fn save(
        &self,
        model_id: &str,
        snapshot: &[u8],
        attributes: &Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let model = inner
            .models
            .get_mut(model_id)
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))?;
        model.checkpoint = Some((snapshot.to_vec(), attributes.clone()));
        inner.snapshot_writes += 1;
        Ok(())
    }

    async fn load_checkpoint_attributes(&self, model_id: &str) -> Result<Value, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .models
            .get(model_id)
            .and_then(|m| m.checkpoint.as_ref())
            .map(|(_, attributes)| attributes.clone())
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))
    }

    async fn update_checkpoint_attributes(
        &self,
        model_id: &str,
        attributes: &Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let checkpoint = inner
            .models
            .get_mut(model_id)
            .and_then(|m| m.checkpoint.as_mut())
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))?;
        checkpoint.1 = attributes.clone();
        inner.attribute_writes += 1;
        Ok(())
    }

    async fn remove(&self, model_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .models
            .remove(model_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))
    }

    async fn clone_model(&self, source: &str, dest: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let copy = inner
            .models
            .get(source)
            .cloned()
            .ok_or_else(|| StoreError::ModelNotFound(source.to_string()))?;
        if inner.models.contains_key(dest) {
            return Err(StoreError::ModelAlreadyExists(dest.to_string()));
        }
        inner.models.insert(dest.to_string(), copy);
        Ok(())
    }
}
