// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swapper Core - exactly-once model hosting over durable queues
//!
//! Every model has its own input queue. Producers submit request batches
//! (commands and input rows) to it; a runner process drains the queue, feeds
//! rows to the model, publishes one result batch per request batch to the
//! shared results queue, and checkpoints the model before acknowledging input.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  submit_requests   ┌───────────────────────────┐
//! │   Producer   │───────────────────►│ swapper.model.input.<id>  │
//! └──────────────┘                    └─────────────┬─────────────┘
//!        │ notify                                   │ consume_requests
//!        ▼                                          ▼
//! ┌──────────────┐                    ┌───────────────────────────┐
//! │  Scheduler   │  spawns            │       ModelRunner         │
//! │ notification │───────────────────►│  (one process per model)  │
//! └──────────────┘                    └──────┬─────────────┬──────┘
//!                                            │             │ submit_results
//!                              ModelArchiver │             ▼
//!                                            ▼       ┌───────────────┐
//!                                  ┌──────────────┐  │ swapper.results│
//!                                  │CheckpointStore│  └───────────────┘
//!                                  └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`interface`] | Queue topology and producer/runner/consumer operations |
//! | [`runner`] | Run loop with duplicate suppression and checkpoint-then-ack |
//! | [`archiver`] | Model load, full/incremental checkpoints, removal |
//! | [`queue`] | `DurableQueue` trait with SQLite and in-memory backends |
//! | [`store`] | `CheckpointStore` trait with SQLite and in-memory backends |
//! | [`model`] | `AnomalyModel`/`ModelFactory` seam and the built-in z-score model |
//!
//! # Status codes
//!
//! Failure results carry one of the codes in [`swapper_protocol::status`];
//! [`SwapperError::status_code`] maps errors onto them.

/// Model archiver: load, checkpoint, remove.
pub mod archiver;

/// Configuration from environment variables.
pub mod config;

/// SQLite pool setup and migrations.
pub mod db;

/// Error types.
pub mod error;

/// Model swapper interface over the queue topology.
pub mod interface;

/// Anomaly models and their factory.
pub mod model;

/// Durable queue trait and backends.
pub mod queue;

/// Model runner.
pub mod runner;

/// Checkpoint store trait and backends.
pub mod store;

pub use archiver::{CheckpointAttributes, CheckpointKind, ModelArchiver};
pub use config::{Config, ConfigError, RunnerConfig, SwapperConfig};
pub use error::{Result, SwapperError};
pub use interface::{BatchConsumer, Consumed, ModelSwapperInterface, SchedulerNotification};
pub use runner::{ModelRunner, RunStats, RunnerState};
