// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Model runner: drains one model's input queue with exactly-once effect.
//!
//! Delivery is at-least-once, so each run works as follows:
//!
//! 1. Consume batches until the queue is empty or the per-checkpoint request
//!    target is reached, skipping batches whose ID was already seen in this run
//!    or is recorded in the latest checkpoint.
//! 2. Process every request of a batch in order and publish one result batch.
//! 3. Checkpoint the model, recording this run's batch IDs, and only then
//!    acknowledge the last batch with `multiple = true`.
//!
//! A crash between checkpoint and acknowledgement redelivers batches whose
//! IDs are already persisted; they are acknowledged and dropped.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use swapper_protocol::{
    Command, CommandMethod, CommandResult, FieldValue, InferenceResult, InputRow, ModelResult,
    Request, status,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::archiver::{CheckpointKind, ModelArchiver};
use crate::config::RunnerConfig;
use crate::error::{Result, SwapperError, error_trace};
use crate::interface::{Consumed, ModelSwapperInterface};
use crate::model::{ModelDefinition, ModelFactory};
use crate::queue::Acker;
use crate::store::CheckpointStore;

/// Longest error text carried in a failure result.
pub const MAX_ERROR_MESSAGE_LEN: usize = 2048;

/// Lifecycle of the model inside a runner process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    NotLoaded,
    Loaded,
    /// Loading failed because the model does not exist; retried on the next batch.
    Error,
    /// The model was deleted; terminal.
    Deleted,
}

/// Counters reported when a runner finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub runs: u64,
    pub batches_processed: u64,
    pub duplicates_skipped: u64,
    pub rows: u64,
    pub full_checkpoints: u64,
    pub incremental_checkpoints: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Drained,
    TargetReached,
    Deleted,
}

/// Per-batch processing state.
#[derive(Default)]
struct BatchState {
    load_failed: bool,
}

/// Runs one model against its input queue.
pub struct ModelRunner {
    model_id: String,
    swapper: ModelSwapperInterface,
    archiver: ModelArchiver,
    config: RunnerConfig,
    cancel: CancellationToken,
    state: RunnerState,
    stats: RunStats,
}

impl ModelRunner {
    pub fn new(
        model_id: impl Into<String>,
        swapper: ModelSwapperInterface,
        store: Arc<dyn CheckpointStore>,
        factory: Arc<dyn ModelFactory>,
        config: RunnerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let model_id = model_id.into();
        let archiver = ModelArchiver::new(
            model_id.clone(),
            store,
            factory,
            config.max_incremental_samples,
        );
        Self {
            model_id,
            swapper,
            archiver,
            config,
            cancel,
            state: RunnerState::NotLoaded,
            stats: RunStats::default(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Process input until the queue is drained, the model is deleted or the
    /// runner is cancelled.
    pub async fn run(&mut self) -> Result<RunStats> {
        loop {
            if self.cancel.is_cancelled() {
                info!(model_id = %self.model_id, "Runner preempted");
                break;
            }
            match self.run_once().await? {
                RunOutcome::TargetReached => continue,
                RunOutcome::Drained | RunOutcome::Deleted => break,
            }
        }
        Ok(self.stats)
    }

    #[instrument(skip(self), fields(model_id = %self.model_id))]
    async fn run_once(&mut self) -> Result<RunOutcome> {
        let mut consumer = match self.swapper.consume_requests(&self.model_id, false).await {
            Ok(consumer) => consumer,
            Err(SwapperError::ModelNotFound { .. }) => {
                warn!("Model input queue not found, nothing to run");
                return Ok(RunOutcome::Drained);
            }
            Err(e) => return Err(e),
        };
        self.stats.runs += 1;

        let mut seen: HashSet<String> = HashSet::new();
        let mut batch_ids: Vec<String> = Vec::new();
        let mut new_samples: Vec<Vec<FieldValue>> = Vec::new();
        let mut last_ack: Option<Acker> = None;
        let mut requests_processed = 0usize;
        let mut outcome = RunOutcome::Drained;

        while let Some(Consumed { batch, ack }) = consumer.next().await? {
            if seen.contains(&batch.batch_id)
                || self
                    .archiver
                    .persisted_batch_ids()
                    .await?
                    .contains(&batch.batch_id)
            {
                debug!(batch_id = %batch.batch_id, "Skipping duplicate batch");
                ack.ack(false).await?;
                self.stats.duplicates_skipped += 1;
                continue;
            }

            let results = self.process_batch(&batch.requests, &mut new_samples).await?;
            requests_processed += batch.requests.len();
            seen.insert(batch.batch_id.clone());
            batch_ids.push(batch.batch_id);

            self.swapper.submit_results(&self.model_id, results).await?;
            last_ack = Some(ack);
            self.stats.batches_processed += 1;

            if self.state == RunnerState::Deleted {
                outcome = RunOutcome::Deleted;
                break;
            }
            if requests_processed >= self.config.target_requests_per_checkpoint {
                outcome = RunOutcome::TargetReached;
                break;
            }
        }

        if let Some(ack) = last_ack {
            match self.archiver.checkpoint(batch_ids, new_samples).await? {
                Some(CheckpointKind::Full) => self.stats.full_checkpoints += 1,
                Some(CheckpointKind::Incremental) => self.stats.incremental_checkpoints += 1,
                None => {}
            }
            ack.ack(true).await?;
        }

        if outcome == RunOutcome::Deleted {
            self.swapper
                .cleanup_after_model_deletion(&self.model_id)
                .await?;
        }

        debug!(requests = requests_processed, ?outcome, "Run finished");
        Ok(outcome)
    }

    async fn process_batch(
        &mut self,
        requests: &[Request],
        samples: &mut Vec<Vec<FieldValue>>,
    ) -> Result<Vec<ModelResult>> {
        let mut batch = BatchState::default();
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result: ModelResult = match request {
                Request::Command(command) => self.handle_command(command).await.into(),
                Request::InputRow(row) => self.handle_row(row, &mut batch, samples).await?.into(),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn handle_row(
        &mut self,
        row: &InputRow,
        batch: &mut BatchState,
        samples: &mut Vec<Vec<FieldValue>>,
    ) -> Result<InferenceResult> {
        if self.state == RunnerState::Deleted || batch.load_failed {
            return Ok(InferenceResult::failure(
                row.row_id,
                status::ERR_NO_SUCH_MODEL,
                format!("Model '{}' not found", self.model_id),
            ));
        }

        if !self.archiver.is_loaded() {
            match self.archiver.ensure_loaded().await {
                Ok(()) => self.state = RunnerState::Loaded,
                Err(e @ SwapperError::ModelNotFound { .. }) => {
                    warn!(model_id = %self.model_id, row_id = row.row_id, "Model not found, failing rows");
                    self.state = RunnerState::Error;
                    batch.load_failed = true;
                    return Ok(InferenceResult::failure(
                        row.row_id,
                        status::ERR_NO_SUCH_MODEL,
                        error_trace(&e, MAX_ERROR_MESSAGE_LEN),
                    ));
                }
                Err(e @ (SwapperError::Store(_) | SwapperError::Queue(_))) => return Err(e),
                Err(e) => {
                    warn!(model_id = %self.model_id, error = %e, "Model failed to load");
                    return Ok(InferenceResult::failure(
                        row.row_id,
                        status::ERR,
                        error_trace(&e, MAX_ERROR_MESSAGE_LEN),
                    ));
                }
            }
        }

        match self.archiver.run_row(&row.data) {
            Ok(score) => {
                samples.push(row.data.clone());
                self.stats.rows += 1;
                Ok(InferenceResult::success(row.row_id, score))
            }
            Err(e) => {
                debug!(row_id = row.row_id, error = %e, "Row failed");
                Ok(InferenceResult::failure(
                    row.row_id,
                    status::ERR,
                    error_trace(&e, MAX_ERROR_MESSAGE_LEN),
                ))
            }
        }
    }

    async fn handle_command(&mut self, command: &Command) -> CommandResult {
        let outcome = match &command.method {
            CommandMethod::DefineModel => self.define_model(command.args.as_ref()).await,
            CommandMethod::DeleteModel => self.delete_model().await,
            CommandMethod::CloneModel => self.clone_model(command.args.as_ref()).await,
            CommandMethod::Other(method) => Err(SwapperError::InvalidArgument(format!(
                "unknown command method '{method}'"
            ))),
        };

        match outcome {
            Ok(()) => CommandResult::success(
                command.command_id.clone(),
                command.method.clone(),
                command.args.clone().unwrap_or_default(),
            ),
            Err(e) => {
                warn!(
                    model_id = %self.model_id,
                    command_id = %command.command_id,
                    method = %command.method,
                    error = %e,
                    "Command failed"
                );
                CommandResult::failure(
                    command.command_id.clone(),
                    command.method.clone(),
                    e.status_code(),
                    error_trace(&e, MAX_ERROR_MESSAGE_LEN),
                )
            }
        }
    }

    async fn define_model(&mut self, args: Option<&Map<String, Value>>) -> Result<()> {
        let args = args.ok_or_else(|| {
            SwapperError::InvalidArgument("defineModel requires arguments".to_string())
        })?;
        let definition = ModelDefinition::from_args(args)?;
        self.archiver.define(&definition).await?;
        info!(model_id = %self.model_id, "Model defined");
        Ok(())
    }

    async fn delete_model(&mut self) -> Result<()> {
        self.archiver.remove().await?;
        self.state = RunnerState::Deleted;
        info!(model_id = %self.model_id, "Model deleted");
        Ok(())
    }

    async fn clone_model(&mut self, args: Option<&Map<String, Value>>) -> Result<()> {
        let dest = args
            .and_then(|a| a.get("modelID"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SwapperError::InvalidArgument("cloneModel requires a 'modelID' string".to_string())
            })?;

        match self.archiver.clone_to(dest).await {
            Ok(()) => {
                info!(model_id = %self.model_id, new_model_id = %dest, "Model cloned");
                Ok(())
            }
            Err(SwapperError::ModelAlreadyExists { .. }) => {
                info!(model_id = %self.model_id, new_model_id = %dest, "Clone destination already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
