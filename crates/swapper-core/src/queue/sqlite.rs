// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed queue implementation.
//!
//! Messages live in `swapper_messages` until acknowledged; the row id is the
//! delivery tag, so delivery order is insertion order.

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::SqlitePool;

use super::{Delivery, DurableQueue, QueueError};

/// SQLite-backed durable queue service.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    /// Create a queue service from a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_queue(&self, name: &str) -> Result<(), QueueError> {
        if self.queue_exists(name).await? {
            Ok(())
        } else {
            Err(QueueError::NotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl DurableQueue for SqliteQueue {
    async fn create_queue(&self, name: &str, durable: bool) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO swapper_queues (name, durable)
            VALUES (?, ?)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(durable)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM swapper_messages WHERE queue_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM swapper_queues WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn purge(&self, name: &str) -> Result<u64, QueueError> {
        self.require_queue(name).await?;

        let result = sqlx::query("DELETE FROM swapper_messages WHERE queue_name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn publish(&self, name: &str, body: Bytes, persistent: bool) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT name FROM swapper_queues WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(QueueError::NotFound(name.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO swapper_messages (queue_name, body, persistent)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(&body[..])
        .bind(persistent)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_after(
        &self,
        name: &str,
        after: Option<u64>,
    ) -> Result<Option<Delivery>, QueueError> {
        let cursor = after.map(|tag| tag as i64).unwrap_or(0);
        let row: Option<(i64, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, body
            FROM swapper_messages
            WHERE queue_name = ? AND id > ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(cursor)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, body)) => Ok(Some(Delivery {
                delivery_tag: id as u64,
                body: Bytes::from(body),
            })),
            None => {
                self.require_queue(name).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, name: &str, delivery_tag: u64, multiple: bool) -> Result<(), QueueError> {
        let query = if multiple {
            "DELETE FROM swapper_messages WHERE queue_name = ? AND id <= ?"
        } else {
            "DELETE FROM swapper_messages WHERE queue_name = ? AND id = ?"
        };
        sqlx::query(query)
            .bind(name)
            .bind(delivery_tag as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn is_empty(&self, name: &str) -> Result<bool, QueueError> {
        self.require_queue(name).await?;

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM swapper_messages WHERE queue_name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0 == 0)
    }

    async fn queue_exists(&self, name: &str) -> Result<bool, QueueError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM swapper_queues WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM swapper_queues ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
