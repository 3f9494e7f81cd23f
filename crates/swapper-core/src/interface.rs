// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Model swapper interface.
//!
//! Producer-facing and runner-facing operations over the queue topology:
//!
//! ```text
//! producer ──submit_requests──► <prefix><model_id> ──consume_requests──► runner
//!     │                                                                    │
//!     └──notify──► scheduler queue                 results queue ◄──submit_results
//! ```
//!
//! Request messages are `batch_id\nbatch`, result messages `model_id\nbatch`.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};
use swapper_protocol::{
    Command, CommandMethod, DecodeError, ModelResult, Request, RequestBatch, ResultBatch,
    marshal_scheduler_notification, unmarshal_scheduler_notification,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SwapperConfig;
use crate::error::{Result, SwapperError};
use crate::queue::{Acker, DurableQueue, QueueConsumer, QueueError};

/// A message type a [`BatchConsumer`] can decode.
pub trait DecodeMessage: Sized {
    fn decode(body: &[u8]) -> std::result::Result<Self, DecodeError>;
}

impl DecodeMessage for RequestBatch {
    fn decode(body: &[u8]) -> std::result::Result<Self, DecodeError> {
        RequestBatch::from_message(body)
    }
}

impl DecodeMessage for ResultBatch {
    fn decode(body: &[u8]) -> std::result::Result<Self, DecodeError> {
        ResultBatch::from_message(body)
    }
}

/// A "model has input" notice for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerNotification {
    pub model_id: String,
}

impl DecodeMessage for SchedulerNotification {
    fn decode(body: &[u8]) -> std::result::Result<Self, DecodeError> {
        Ok(Self {
            model_id: unmarshal_scheduler_notification(body)?,
        })
    }
}

/// A decoded message and the handle acknowledging it.
#[derive(Debug)]
pub struct Consumed<B> {
    pub batch: B,
    pub ack: Acker,
}

/// Decoding consumer over one queue.
///
/// Decode failures are returned as errors; the undecodable message stays
/// unacknowledged.
pub struct BatchConsumer<B> {
    inner: QueueConsumer,
    _marker: PhantomData<fn() -> B>,
}

impl<B: DecodeMessage> BatchConsumer<B> {
    fn new(inner: QueueConsumer) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Next decoded message, or `None` once a non-blocking consumer finds the
    /// queue empty.
    pub async fn next(&mut self) -> Result<Option<Consumed<B>>> {
        let Some((delivery, ack)) = self.inner.next().await? else {
            return Ok(None);
        };
        let batch = B::decode(&delivery.body)?;
        Ok(Some(Consumed { batch, ack }))
    }
}

/// Swapper operations shared by producers, runners and the results consumer.
#[derive(Clone)]
pub struct ModelSwapperInterface {
    queue: Arc<dyn DurableQueue>,
    config: SwapperConfig,
}

impl ModelSwapperInterface {
    pub fn new(queue: Arc<dyn DurableQueue>, config: SwapperConfig) -> Self {
        Self { queue, config }
    }

    pub fn config(&self) -> &SwapperConfig {
        &self.config
    }

    /// Name of a model's input queue.
    pub fn input_queue_name(&self, model_id: &str) -> String {
        format!("{}{}", self.config.model_input_queue_prefix, model_id)
    }

    /// Create the model's input queue and submit a `defineModel` command.
    #[instrument(skip(self, args), fields(model_id = %model_id))]
    pub async fn define_model(
        &self,
        model_id: &str,
        args: Map<String, Value>,
        command_id: &str,
    ) -> Result<String> {
        self.queue
            .create_queue(&self.input_queue_name(model_id), true)
            .await?;
        let command = Command::new(command_id, CommandMethod::DefineModel, Some(args));
        self.submit_requests(model_id, vec![command.into()]).await
    }

    /// Purge pending input and submit a `deleteModel` command.
    ///
    /// Idempotent: a model without an input queue is treated as deleted.
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub async fn delete_model(&self, model_id: &str, command_id: &str) -> Result<()> {
        match self.queue.purge(&self.input_queue_name(model_id)).await {
            Ok(purged) => debug!(purged, "Purged model input queue"),
            Err(QueueError::NotFound(_)) => {
                info!("Model input queue not found, nothing to purge");
            }
            Err(e) => return Err(e.into()),
        }

        let command = Command::new(command_id, CommandMethod::DeleteModel, None);
        match self.submit_requests(model_id, vec![command.into()]).await {
            Ok(_) => Ok(()),
            Err(SwapperError::ModelNotFound { .. }) => {
                info!("Model not found, deleteModel already applied");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create the new model's input queue and ask the source model to clone
    /// itself into it.
    #[instrument(skip(self), fields(model_id = %model_id, new_model_id = %new_model_id))]
    pub async fn clone_model(
        &self,
        model_id: &str,
        new_model_id: &str,
        command_id: &str,
    ) -> Result<String> {
        self.queue
            .create_queue(&self.input_queue_name(new_model_id), true)
            .await?;

        let mut args = Map::new();
        args.insert("modelID".to_string(), Value::String(new_model_id.to_string()));
        let command = Command::new(command_id, CommandMethod::CloneModel, Some(args));
        self.submit_requests(model_id, vec![command.into()]).await
    }

    /// Publish a request batch to the model's input queue and return its batch ID.
    #[instrument(skip(self, requests), fields(model_id = %model_id, count = requests.len()))]
    pub async fn submit_requests(&self, model_id: &str, requests: Vec<Request>) -> Result<String> {
        let batch = RequestBatch {
            batch_id: Uuid::new_v4().to_string(),
            requests,
        };
        let body = batch.to_message()?;

        match self
            .queue
            .publish(&self.input_queue_name(model_id), body, true)
            .await
        {
            Ok(()) => {}
            Err(QueueError::NotFound(_)) => {
                return Err(SwapperError::ModelNotFound {
                    model_id: model_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        debug!(batch_id = %batch.batch_id, "Submitted request batch");

        if let Err(e) = self.notify_scheduler(model_id).await {
            warn!(error = %e, "Failed to notify scheduler");
        }

        Ok(batch.batch_id)
    }

    async fn notify_scheduler(&self, model_id: &str) -> Result<()> {
        let body = marshal_scheduler_notification(model_id)?;
        self.queue
            .publish(&self.config.scheduler_notification_queue, body, false)
            .await?;
        Ok(())
    }

    /// Publish a result batch, creating the results queue on first use.
    #[instrument(skip(self, results), fields(model_id = %model_id, count = results.len()))]
    pub async fn submit_results(&self, model_id: &str, results: Vec<ModelResult>) -> Result<()> {
        let body = ResultBatch {
            model_id: model_id.to_string(),
            results,
        }
        .to_message()?;

        let queue = &self.config.results_queue;
        match self.queue.publish(queue, body.clone(), true).await {
            Err(QueueError::NotFound(_)) => {
                info!(queue = %queue, "Results queue not found, creating it");
                self.queue.create_queue(queue, true).await?;
                self.queue.publish(queue, body, true).await?;
            }
            other => other?,
        }
        Ok(())
    }

    /// Consumer over the model's input queue.
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub async fn consume_requests(
        &self,
        model_id: &str,
        blocking: bool,
    ) -> Result<BatchConsumer<RequestBatch>> {
        let name = self.input_queue_name(model_id);
        if !self.queue.queue_exists(&name).await? {
            return Err(SwapperError::ModelNotFound {
                model_id: model_id.to_string(),
            });
        }
        Ok(BatchConsumer::new(self.consumer(name, blocking)))
    }

    /// Consumer over the shared results queue, created if missing.
    #[instrument(skip(self), fields(queue = %self.config.results_queue))]
    pub async fn consume_results(&self, blocking: bool) -> Result<BatchConsumer<ResultBatch>> {
        let name = self.config.results_queue.clone();
        self.queue.create_queue(&name, true).await?;
        Ok(BatchConsumer::new(self.consumer(name, blocking)))
    }

    /// Create the scheduler notification queue.
    #[instrument(skip(self), fields(queue = %self.config.scheduler_notification_queue))]
    pub async fn init_scheduler_notification(&self) -> Result<()> {
        self.queue
            .create_queue(&self.config.scheduler_notification_queue, true)
            .await?;
        Ok(())
    }

    /// Consumer over scheduler notifications, created if missing.
    #[instrument(skip(self), fields(queue = %self.config.scheduler_notification_queue))]
    pub async fn consume_model_scheduler_notifications(
        &self,
        blocking: bool,
    ) -> Result<BatchConsumer<SchedulerNotification>> {
        self.init_scheduler_notification().await?;
        let name = self.config.scheduler_notification_queue.clone();
        Ok(BatchConsumer::new(self.consumer(name, blocking)))
    }

    /// Whether the model's input queue holds unconsumed messages.
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub async fn model_input_pending(&self, model_id: &str) -> Result<bool> {
        self.queue_pending(&self.input_queue_name(model_id)).await
    }

    /// IDs of all models whose input queue holds unconsumed messages.
    #[instrument(skip(self), fields(prefix = %self.config.model_input_queue_prefix))]
    pub async fn get_models_with_input_pending(&self) -> Result<Vec<String>> {
        let prefix = &self.config.model_input_queue_prefix;
        let mut pending = Vec::new();
        for name in self.queue.list_queues().await? {
            let Some(model_id) = name.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if self.queue_pending(&name).await? {
                pending.push(model_id.to_string());
            }
        }
        Ok(pending)
    }

    /// Delete the model's input queue once the model is gone.
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub async fn cleanup_after_model_deletion(&self, model_id: &str) -> Result<()> {
        self.queue
            .delete_queue(&self.input_queue_name(model_id))
            .await?;
        info!("Deleted model input queue");
        Ok(())
    }

    async fn queue_pending(&self, name: &str) -> Result<bool> {
        match self.queue.is_empty(name).await {
            Ok(empty) => Ok(!empty),
            Err(QueueError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn consumer(&self, name: String, blocking: bool) -> QueueConsumer {
        QueueConsumer::new(self.queue.clone(), name, blocking, self.config.poll_interval)
    }
}
