// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Model archiver: loads models from the checkpoint store and checkpoints them.
//!
//! A checkpoint is either *full* (new snapshot, sample log reset) or
//! *incremental* (attributes only, new samples appended to the log). Samples in
//! the log are replayed through the model on load, so the restored model sees
//! exactly the rows reflected in the checkpoint's batch IDs.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swapper_protocol::FieldValue;
use tracing::{debug, info};

use crate::error::{Result, SwapperError};
use crate::model::{AnomalyModel, ModelDefinition, ModelFactory, RowConverter};
use crate::store::{CheckpointStore, StoreError};

/// Checkpoint attribute object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointAttributes {
    /// Batches reflected in the snapshot plus incremental samples.
    #[serde(rename = "batchIDs", default)]
    pub batch_ids: Vec<String>,
    /// Rows applied since the last full snapshot, in order.
    #[serde(rename = "incrementalSamples", default)]
    pub incremental_samples: Vec<Vec<FieldValue>>,
}

impl CheckpointAttributes {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| SwapperError::Store(StoreError::Json(e)))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| SwapperError::Store(StoreError::Json(e)))
    }
}

/// Kind of checkpoint written by [`ModelArchiver::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Full,
    Incremental,
}

struct LoadedModel {
    model: Box<dyn AnomalyModel>,
    converter: RowConverter,
    has_checkpoint: bool,
    pending_samples: Vec<Vec<FieldValue>>,
}

/// Loads, checkpoints and removes one model.
pub struct ModelArchiver {
    model_id: String,
    store: Arc<dyn CheckpointStore>,
    factory: Arc<dyn ModelFactory>,
    max_incremental_samples: usize,
    loaded: Option<LoadedModel>,
    persisted_batch_ids: Option<HashSet<String>>,
}

impl ModelArchiver {
    pub fn new(
        model_id: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
        factory: Arc<dyn ModelFactory>,
        max_incremental_samples: usize,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            store,
            factory,
            max_incremental_samples,
            loaded: None,
            persisted_batch_ids: None,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Incremental samples held since the last full checkpoint.
    pub fn pending_sample_count(&self) -> usize {
        self.loaded
            .as_ref()
            .map(|l| l.pending_samples.len())
            .unwrap_or(0)
    }

    /// Batch IDs of the latest checkpoint, read from attributes only.
    ///
    /// A model without a checkpoint has none.
    pub async fn persisted_batch_ids(&mut self) -> Result<&HashSet<String>> {
        if self.persisted_batch_ids.is_none() {
            let ids = match self.load_attributes().await? {
                Some(attributes) => attributes.batch_ids.into_iter().collect(),
                None => HashSet::new(),
            };
            self.persisted_batch_ids = Some(ids);
        }
        let ids = self.persisted_batch_ids.get_or_insert_with(HashSet::new);
        Ok(&*ids)
    }

    async fn load_attributes(&self) -> Result<Option<CheckpointAttributes>> {
        match self.store.load_checkpoint_attributes(&self.model_id).await {
            Ok(value) => Ok(Some(CheckpointAttributes::from_value(value)?)),
            Err(StoreError::ModelNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a new definition.
    pub async fn define(&self, definition: &ModelDefinition) -> Result<()> {
        self.store.define(&self.model_id, definition).await?;
        Ok(())
    }

    /// Load the model if it is not loaded yet.
    ///
    /// Fails with [`SwapperError::ModelNotFound`] when no definition exists.
    pub async fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded.is_some() {
            return Ok(());
        }

        let snapshot = match self.store.load(&self.model_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(StoreError::ModelNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let definition = self.store.load_model_definition(&self.model_id).await?;
        let converter = RowConverter::new(definition.input_schema.clone());

        let loaded = match snapshot {
            None => {
                debug!(model_id = %self.model_id, "No checkpoint, creating model from definition");
                LoadedModel {
                    model: self.factory.create(&definition)?,
                    converter,
                    has_checkpoint: false,
                    pending_samples: Vec::new(),
                }
            }
            Some(snapshot) => {
                let mut model = self.factory.restore(&definition, &snapshot)?;
                let attributes = self.load_attributes().await?.unwrap_or_default();
                for sample in &attributes.incremental_samples {
                    let record = converter.convert(sample)?;
                    model.run(&record)?;
                }
                debug!(
                    model_id = %self.model_id,
                    replayed = attributes.incremental_samples.len(),
                    "Restored model from checkpoint"
                );
                self.persisted_batch_ids = Some(attributes.batch_ids.into_iter().collect());
                LoadedModel {
                    model,
                    converter,
                    has_checkpoint: true,
                    pending_samples: attributes.incremental_samples,
                }
            }
        };

        self.loaded = Some(loaded);
        Ok(())
    }

    /// Convert a raw row and feed it to the loaded model.
    pub fn run_row(&mut self, data: &[FieldValue]) -> Result<f64> {
        let loaded = self.loaded.as_mut().ok_or_else(|| SwapperError::ModelNotFound {
            model_id: self.model_id.clone(),
        })?;
        let record = loaded.converter.convert(data)?;
        Ok(loaded.model.run(&record)?)
    }

    /// Checkpoint the loaded model. Returns `None` when nothing is loaded.
    ///
    /// `batch_ids` replaces the persisted set; `new_samples` are the rows the
    /// model consumed since the previous checkpoint.
    pub async fn checkpoint(
        &mut self,
        batch_ids: Vec<String>,
        new_samples: Vec<Vec<FieldValue>>,
    ) -> Result<Option<CheckpointKind>> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(None);
        };

        let full = !loaded.has_checkpoint
            || loaded.pending_samples.len() + new_samples.len() > self.max_incremental_samples;

        let kind = if full {
            let snapshot = loaded.model.snapshot()?;
            let attributes = CheckpointAttributes {
                batch_ids: batch_ids.clone(),
                incremental_samples: Vec::new(),
            };
            self.store
                .save(&self.model_id, &snapshot, &attributes.to_value()?)
                .await?;
            loaded.has_checkpoint = true;
            loaded.pending_samples.clear();
            CheckpointKind::Full
        } else {
            let mut samples = loaded.pending_samples.clone();
            samples.extend(new_samples);
            let attributes = CheckpointAttributes {
                batch_ids: batch_ids.clone(),
                incremental_samples: samples,
            };
            self.store
                .update_checkpoint_attributes(&self.model_id, &attributes.to_value()?)
                .await?;
            loaded.pending_samples = attributes.incremental_samples;
            CheckpointKind::Incremental
        };

        debug!(
            model_id = %self.model_id,
            ?kind,
            batches = batch_ids.len(),
            pending_samples = loaded.pending_samples.len(),
            "Checkpoint written"
        );
        self.persisted_batch_ids = Some(batch_ids.into_iter().collect());
        Ok(Some(kind))
    }

    /// Copy this model's definition and last checkpoint to `dest`.
    pub async fn clone_to(&self, dest: &str) -> Result<()> {
        self.store.clone_model(&self.model_id, dest).await?;
        Ok(())
    }

    /// Remove the model from the store and unload it. A missing model is not
    /// an error.
    pub async fn remove(&mut self) -> Result<()> {
        match self.store.remove(&self.model_id).await {
            Ok(()) => {}
            Err(StoreError::ModelNotFound(_)) => {
                info!(model_id = %self.model_id, "Model already removed");
            }
            Err(e) => return Err(e.into()),
        }
        self.unload();
        self.persisted_batch_ids = Some(HashSet::new());
        Ok(())
    }

    /// Drop the in-memory model.
    pub fn unload(&mut self) {
        self.loaded = None;
    }
}
