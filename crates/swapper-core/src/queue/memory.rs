// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory queue backend for tests and embedded use.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use super::{Delivery, DurableQueue, QueueError};

/// An acknowledgement observed by [`MemoryQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    /// Acknowledged delivery tag.
    pub delivery_tag: u64,
    /// Whether predecessors were acknowledged too.
    pub multiple: bool,
}

#[derive(Default)]
struct QueueState {
    next_tag: u64,
    messages: BTreeMap<u64, Bytes>,
    acks: Vec<AckRecord>,
    published: u64,
}

/// Queue service kept entirely in process memory.
///
/// Records acknowledgements and publish counts so tests can assert on them.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryQueue {
    /// Create an empty queue service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledgements received by a queue, in order.
    pub async fn acks(&self, name: &str) -> Vec<AckRecord> {
        let queues = self.queues.lock().await;
        queues.get(name).map(|q| q.acks.clone()).unwrap_or_default()
    }

    /// Number of messages ever published to a queue.
    pub async fn published_count(&self, name: &str) -> u64 {
        let queues = self.queues.lock().await;
        queues.get(name).map(|q| q.published).unwrap_or(0)
    }

    /// Bodies of the unacknowledged messages of a queue.
    pub async fn pending(&self, name: &str) -> Vec<Bytes> {
        let queues = self.queues.lock().await;
        queues
            .get(name)
            .map(|q| q.messages.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn create_queue(&self, name: &str, _durable: bool) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        self.queues.lock().await.remove(name);
        Ok(())
    }

    async fn purge(&self, name: &str) -> Result<u64, QueueError> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        let purged = queue.messages.len() as u64;
        queue.messages.clear();
        Ok(purged)
    }

    async fn publish(&self, name: &str, body: Bytes, _persistent: bool) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        queue.next_tag += 1;
        let tag = queue.next_tag;
        queue.messages.insert(tag, body);
        queue.published += 1;
        Ok(())
    }

    async fn fetch_after(
        &self,
        name: &str,
        after: Option<u64>,
    ) -> Result<Option<Delivery>, QueueError> {
        let queues = self.queues.lock().await;
        let queue = queues
            .get(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        let start = after.map(|tag| tag + 1).unwrap_or(0);
        Ok(queue
            .messages
            .range(start..)
            .next()
            .map(|(tag, body)| Delivery {
                delivery_tag: *tag,
                body: body.clone(),
            }))
    }

    async fn ack(&self, name: &str, delivery_tag: u64, multiple: bool) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        if multiple {
            queue.messages = queue.messages.split_off(&(delivery_tag + 1));
        } else {
            queue.messages.remove(&delivery_tag);
        }
        queue.acks.push(AckRecord {
            delivery_tag,
            multiple,
        });
        Ok(())
    }

    async fn is_empty(&self, name: &str) -> Result<bool, QueueError> {
        let queues = self.queues.lock().await;
        let queue = queues
            .get(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        Ok(queue.messages.is_empty())
    }

    async fn queue_exists(&self, name: &str) -> Result<bool, QueueError> {
        Ok(self.queues.lock().await.contains_key(name))
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let mut names: Vec<String> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
