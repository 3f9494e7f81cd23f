// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Model runner process.
//!
//! Drains one model's input queue and exits. The scheduler that spawned it can
//! preempt the runner by closing its stdin; Ctrl-C does the same. Preemption
//! takes effect between runs, after the current checkpoint and ack.

use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use swapper_core::config::Config;
use swapper_core::db;
use swapper_core::interface::ModelSwapperInterface;
use swapper_core::model::BuiltinModelFactory;
use swapper_core::queue::SqliteQueue;
use swapper_core::runner::ModelRunner;
use swapper_core::store::SqliteCheckpointStore;

/// Run a model against its input queue until drained or preempted.
#[derive(Debug, Parser)]
#[command(name = "model-runner", version)]
struct Args {
    /// Model to run
    #[arg(long, env = "SWAPPER_MODEL_ID")]
    model_id: String,

    /// Treat stdin EOF as a preemption request
    #[arg(long, env = "SWAPPER_WATCH_STDIN", default_value_t = true, action = ArgAction::Set)]
    watch_stdin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swapper_core=info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        model_id = %args.model_id,
        target_requests_per_checkpoint = config.runner.target_requests_per_checkpoint,
        max_incremental_samples = config.runner.max_incremental_samples,
        "SWAP.MR.START.RUN"
    );

    let pool = db::connect(&config.database_url).await?;
    let queue = Arc::new(SqliteQueue::new(pool.clone()));
    let store = Arc::new(SqliteCheckpointStore::new(pool.clone()));
    let swapper = ModelSwapperInterface::new(queue, config.swapper.clone());

    let cancel = CancellationToken::new();
    spawn_preemption_watchers(cancel.clone(), args.watch_stdin);

    let mut runner = ModelRunner::new(
        args.model_id.clone(),
        swapper,
        store,
        Arc::new(BuiltinModelFactory),
        config.runner,
        cancel,
    );

    let outcome = runner.run().await;
    pool.close().await;

    match outcome {
        Ok(stats) => {
            info!(
                model_id = %args.model_id,
                runs = stats.runs,
                batches = stats.batches_processed,
                duplicates = stats.duplicates_skipped,
                rows = stats.rows,
                full_checkpoints = stats.full_checkpoints,
                incremental_checkpoints = stats.incremental_checkpoints,
                state = ?runner.state(),
                "SWAP.MR.FINISHED"
            );
            Ok(())
        }
        Err(e) => {
            error!(model_id = %args.model_id, error = %e, "SWAP.MR.FINISHED with error");
            Err(e.into())
        }
    }
}

fn spawn_preemption_watchers(cancel: CancellationToken, watch_stdin: bool) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, preempting");
            token.cancel();
        }
    });

    if watch_stdin {
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 256];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            info!("Stdin closed, preempting");
            cancel.cancel();
        });
    }
}
