// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for swapper-core integration tests.
//!
//! Provides TestContext wiring in-memory queue and store backends to the
//! swapper interface and runners.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use swapper_core::config::{RunnerConfig, SwapperConfig};
use swapper_core::interface::ModelSwapperInterface;
use swapper_core::model::{BuiltinModelFactory, ModelDefinition};
use swapper_core::queue::{DurableQueue, MemoryQueue};
use swapper_core::runner::ModelRunner;
use swapper_core::store::{CheckpointStore, MemoryCheckpointStore};
use swapper_protocol::{FieldValue, InputRow, ModelResult, Request, ResultBatch};

pub const MODEL_ID: &str = "model-1";

/// Swapper config with a short poll interval.
pub fn swapper_config() -> SwapperConfig {
    SwapperConfig {
        poll_interval: Duration::from_millis(5),
        ..SwapperConfig::default()
    }
}

/// `defineModel` arguments for a z-score model over `[c0: float]`.
pub fn define_args() -> Map<String, Value> {
    json!({
        "modelConfig": {"modelType": "zscore"},
        "inferenceArgs": {"inputPredictedField": "c0"},
        "inputRecordSchema": [{"name": "c0", "type": "float"}]
    })
    .as_object()
    .cloned()
    .unwrap()
}

pub fn definition() -> ModelDefinition {
    ModelDefinition::from_args(&define_args()).unwrap()
}

/// `defineModel` arguments for a z-score model over `[c0: datetime, c1: float]`.
pub fn timed_define_args() -> Map<String, Value> {
    json!({
        "modelConfig": {"modelType": "zscore"},
        "inferenceArgs": {"inputPredictedField": "c1"},
        "inputRecordSchema": [
            {"name": "c0", "type": "datetime", "special": "timestamp"},
            {"name": "c1", "type": "float"}
        ]
    })
    .as_object()
    .cloned()
    .unwrap()
}

pub fn timed_definition() -> ModelDefinition {
    ModelDefinition::from_args(&timed_define_args()).unwrap()
}

/// Timestamp `offset_secs` after a fixed base, with a microsecond part.
pub fn timestamp(offset_secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(1_420_074_123 + offset_secs, 456_789_000)
        .unwrap()
        .naive_utc()
}

/// A `[timestamp, value]` input row.
pub fn timed_row(row_id: i64, offset_secs: i64, value: f64) -> Request {
    InputRow::new(
        row_id,
        vec![
            FieldValue::DateTime(timestamp(offset_secs)),
            FieldValue::Float(value),
        ],
    )
    .into()
}

/// A single-value input row.
pub fn row(row_id: i64, value: f64) -> Request {
    InputRow::new(row_id, vec![FieldValue::Float(value)]).into()
}

/// Test context over in-memory backends.
pub struct TestContext {
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryCheckpointStore>,
    pub swapper: ModelSwapperInterface,
}

impl TestContext {
    pub fn new() -> Self {
        let queue = Arc::new(MemoryQueue::new());
        Self::with_queue(queue.clone(), queue)
    }

    /// Context whose swapper talks to `transport` while assertions read
    /// `queue` directly.
    pub fn with_queue(queue: Arc<MemoryQueue>, transport: Arc<dyn DurableQueue>) -> Self {
        Self {
            queue,
            store: Arc::new(MemoryCheckpointStore::new()),
            swapper: ModelSwapperInterface::new(transport, swapper_config()),
        }
    }

    /// Create the input queue and store the definition without a command.
    pub async fn provision(&self, model_id: &str) {
        self.provision_with(model_id, &definition()).await;
    }

    pub async fn provision_with(&self, model_id: &str, definition: &ModelDefinition) {
        self.queue
            .create_queue(&self.swapper.input_queue_name(model_id), true)
            .await
            .unwrap();
        self.store.define(model_id, definition).await.unwrap();
    }

    pub fn runner(&self, model_id: &str, config: RunnerConfig) -> ModelRunner {
        ModelRunner::new(
            model_id,
            self.swapper.clone(),
            self.store.clone(),
            Arc::new(BuiltinModelFactory),
            config,
            CancellationToken::new(),
        )
    }

    /// Consume and acknowledge everything on the results queue.
    pub async fn drain_results(&self) -> Vec<ResultBatch> {
        let mut consumer = self.swapper.consume_results(false).await.unwrap();
        let mut batches = Vec::new();
        while let Some(consumed) = consumer.next().await.unwrap() {
            consumed.ack.ack(false).await.unwrap();
            batches.push(consumed.batch);
        }
        batches
    }

    pub async fn input_acks(&self, model_id: &str) -> Vec<swapper_core::queue::AckRecord> {
        self.queue
            .acks(&self.swapper.input_queue_name(model_id))
            .await
    }
}

/// All results of the given batches, flattened in order.
pub fn flatten(batches: &[ResultBatch]) -> Vec<ModelResult> {
    batches.iter().flat_map(|b| b.results.clone()).collect()
}

pub fn runner_config(target: usize, max_samples: usize) -> RunnerConfig {
    RunnerConfig {
        target_requests_per_checkpoint: target,
        max_incremental_samples: max_samples,
    }
}
