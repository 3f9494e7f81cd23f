// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable queue abstraction and backends.
//!
//! Queues provide at-least-once delivery: a message stays in its queue until it
//! is acknowledged, and a fresh consumer starts from the oldest unacknowledged
//! message. Consumers are built on a cursor-based fetch so any backend that can
//! answer "next message after tag N" gets blocking and non-blocking consumption
//! for free.

pub mod memory;
pub mod sqlite;

pub use self::memory::{AckRecord, MemoryQueue};
pub use self::sqlite::SqliteQueue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from queue backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The named queue does not exist.
    #[error("queue not found: {0}")]
    NotFound(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Other backend failure.
    #[error("{0}")]
    Other(String),
}

/// A message handed out by a queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Monotonic position of the message within its queue.
    pub delivery_tag: u64,
    /// Message body.
    pub body: Bytes,
}

/// Durable queue service used by the swapper interface.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Create a queue. Creating an existing queue succeeds.
    async fn create_queue(&self, name: &str, durable: bool) -> Result<(), QueueError>;

    /// Delete a queue and its messages. Deleting a missing queue succeeds.
    async fn delete_queue(&self, name: &str) -> Result<(), QueueError>;

    /// Drop all messages from a queue, returning how many were removed.
    async fn purge(&self, name: &str) -> Result<u64, QueueError>;

    /// Append a message to a queue.
    async fn publish(&self, name: &str, body: Bytes, persistent: bool) -> Result<(), QueueError>;

    /// Return the oldest unacknowledged message with a tag greater than `after`.
    async fn fetch_after(&self, name: &str, after: Option<u64>)
    -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge one message, or every message up to and including `delivery_tag`.
    async fn ack(&self, name: &str, delivery_tag: u64, multiple: bool) -> Result<(), QueueError>;

    /// Whether the queue holds no unacknowledged messages.
    async fn is_empty(&self, name: &str) -> Result<bool, QueueError>;

    /// Whether the queue exists.
    async fn queue_exists(&self, name: &str) -> Result<bool, QueueError>;

    /// Names of all queues.
    async fn list_queues(&self) -> Result<Vec<String>, QueueError>;
}

/// Acknowledgement handle bound to one delivered message.
#[derive(Clone)]
pub struct Acker {
    queue: Arc<dyn DurableQueue>,
    queue_name: String,
    delivery_tag: u64,
}

impl Acker {
    /// Tag of the message this handle acknowledges.
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Acknowledge the message; with `multiple`, also every earlier message.
    pub async fn ack(&self, multiple: bool) -> Result<(), QueueError> {
        self.queue
            .ack(&self.queue_name, self.delivery_tag, multiple)
            .await
    }
}

impl std::fmt::Debug for Acker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acker")
            .field("queue_name", &self.queue_name)
            .field("delivery_tag", &self.delivery_tag)
            .finish()
    }
}

/// Consumer over a single queue.
///
/// A non-blocking consumer ends as soon as it observes the queue empty; a
/// blocking one polls until a message arrives.
pub struct QueueConsumer {
    queue: Arc<dyn DurableQueue>,
    queue_name: String,
    blocking: bool,
    poll_interval: Duration,
    cursor: Option<u64>,
}

impl QueueConsumer {
    /// Create a consumer starting at the oldest unacknowledged message.
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        queue_name: impl Into<String>,
        blocking: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            blocking,
            poll_interval,
            cursor: None,
        }
    }

    /// Name of the consumed queue.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Next message together with its acknowledgement handle.
    pub async fn next(&mut self) -> Result<Option<(Delivery, Acker)>, QueueError> {
        loop {
            if let Some(delivery) = self.queue.fetch_after(&self.queue_name, self.cursor).await? {
                self.cursor = Some(delivery.delivery_tag);
                let acker = Acker {
                    queue: self.queue.clone(),
                    queue_name: self.queue_name.clone(),
                    delivery_tag: delivery.delivery_tag,
                };
                return Ok(Some((delivery, acker)));
            }
            if !self.blocking {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(queue: &Arc<MemoryQueue>, blocking: bool) -> QueueConsumer {
        QueueConsumer::new(queue.clone(), "q", blocking, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_non_blocking_consumer_ends_when_empty() {
        let queue = Arc::new(MemoryQueue::new());
        queue.create_queue("q", true).await.unwrap();
        queue.publish("q", Bytes::from_static(b"a"), true).await.unwrap();
        queue.publish("q", Bytes::from_static(b"b"), true).await.unwrap();

        let mut consumer = open(&queue, false);
        let (first, _) = consumer.next().await.unwrap().unwrap();
        let (second, _) = consumer.next().await.unwrap().unwrap();
        assert_eq!(&first.body[..], b"a");
        assert_eq!(&second.body[..], b"b");
        assert!(consumer.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unacked_messages_are_redelivered() {
        let queue = Arc::new(MemoryQueue::new());
        queue.create_queue("q", true).await.unwrap();
        queue.publish("q", Bytes::from_static(b"a"), true).await.unwrap();
        queue.publish("q", Bytes::from_static(b"b"), true).await.unwrap();

        {
            let mut consumer = open(&queue, false);
            let (_, acker) = consumer.next().await.unwrap().unwrap();
            acker.ack(false).await.unwrap();
            let _ = consumer.next().await.unwrap().unwrap();
        }

        let mut consumer = open(&queue, false);
        let (redelivered, _) = consumer.next().await.unwrap().unwrap();
        assert_eq!(&redelivered.body[..], b"b");
        assert!(consumer.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_multiple_covers_predecessors() {
        let queue = Arc::new(MemoryQueue::new());
        queue.create_queue("q", true).await.unwrap();
        for body in [&b"a"[..], b"b", b"c"] {
            queue.publish("q", Bytes::copy_from_slice(body), true).await.unwrap();
        }

        let mut consumer = open(&queue, false);
        let _ = consumer.next().await.unwrap().unwrap();
        let (_, acker) = consumer.next().await.unwrap().unwrap();
        acker.ack(true).await.unwrap();

        let mut consumer = open(&queue, false);
        let (left, _) = consumer.next().await.unwrap().unwrap();
        assert_eq!(&left.body[..], b"c");
    }

    #[tokio::test]
    async fn test_blocking_consumer_waits_for_publish() {
        let queue = Arc::new(MemoryQueue::new());
        queue.create_queue("q", true).await.unwrap();

        let publisher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher
                .publish("q", Bytes::from_static(b"late"), true)
                .await
                .unwrap();
        });

        let mut consumer = open(&queue, true);
        let (delivery, _) = tokio::time::timeout(Duration::from_secs(5), consumer.next())
            .await
            .expect("blocking consumer timed out")
            .unwrap()
            .unwrap();
        assert_eq!(&delivery.body[..], b"late");
    }

    #[tokio::test]
    async fn test_consumer_on_missing_queue_fails() {
        let queue = Arc::new(MemoryQueue::new());
        let mut consumer = open(&queue, false);
        let err = consumer.next().await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }
}
