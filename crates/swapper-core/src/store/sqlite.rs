// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed checkpoint store.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{CheckpointStore, StoreError};
use crate::model::ModelDefinition;

/// SQLite-backed checkpoint store.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Create a store from a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn define(&self, model_id: &str, definition: &ModelDefinition) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT definition FROM model_definitions WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((stored,)) = existing {
            let stored: ModelDefinition = serde_json::from_str(&stored)?;
            return if stored == *definition {
                Ok(())
            } else {
                Err(StoreError::ModelAlreadyExists(model_id.to_string()))
            };
        }

        sqlx::query(
            r#"
            INSERT INTO model_definitions (model_id, definition)
            VALUES (?, ?)
            "#,
        )
        .bind(model_id)
        .bind(serde_json::to_string(definition)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_model_definition(&self, model_id: &str) -> Result<ModelDefinition, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT definition FROM model_definitions WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;

        let (definition,) = row.ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))?;
        Ok(serde_json::from_str(&definition)?)
    }

    async fn load(&self, model_id: &str) -> Result<Vec<u8>, StoreError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT snapshot FROM model_checkpoints WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(snapshot,)| snapshot)
            .ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))
    }

    async fn save(
        &self,
        model_id: &str,
        snapshot: &[u8],
        attributes: &Value,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let defined: Option<(String,)> =
            sqlx::query_as("SELECT model_id FROM model_definitions WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&mut *tx)
                .await?;
        if defined.is_none() {
            return Err(StoreError::ModelNotFound(model_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO model_checkpoints (model_id, snapshot, attributes, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (model_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                attributes = excluded.attributes,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(model_id)
        .bind(snapshot)
        .bind(serde_json::to_string(attributes)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_checkpoint_attributes(&self, model_id: &str) -> Result<Value, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT attributes FROM model_checkpoints WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;

        let (attributes,) = row.ok_or_else(|| StoreError::ModelNotFound(model_id.to_string()))?;
        Ok(serde_json::from_str(&attributes)?)
    }

    async fn update_checkpoint_attributes(
        &self,
        model_id: &str,
        attributes: &Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE model_checkpoints
            SET attributes = ?, updated_at = CURRENT_TIMESTAMP
            WHERE model_id = ?
            "#,
        )
        .bind(serde_json::to_string(attributes)?)
        .bind(model_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ModelNotFound(model_id.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, model_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM model_checkpoints WHERE model_id = ?")
            .bind(model_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM model_definitions WHERE model_id = ?")
            .bind(model_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ModelNotFound(model_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clone_model(&self, source: &str, dest: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let definition: Option<(String,)> =
            sqlx::query_as("SELECT definition FROM model_definitions WHERE model_id = ?")
                .bind(source)
                .fetch_optional(&mut *tx)
                .await?;
        let (definition,) = definition.ok_or_else(|| StoreError::ModelNotFound(source.to_string()))?;

        let taken: Option<(String,)> =
            sqlx::query_as("SELECT model_id FROM model_definitions WHERE model_id = ?")
                .bind(dest)
                .fetch_optional(&mut *tx)
                .await?;
        if taken.is_some() {
            return Err(StoreError::ModelAlreadyExists(dest.to_string()));
        }

        sqlx::query("INSERT INTO model_definitions (model_id, definition) VALUES (?, ?)")
            .bind(dest)
            .bind(definition)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO model_checkpoints (model_id, snapshot, attributes)
            SELECT ?, snapshot, attributes
            FROM model_checkpoints
            WHERE model_id = ?
            "#,
        )
        .bind(dest)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
