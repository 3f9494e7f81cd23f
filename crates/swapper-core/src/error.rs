// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for swapper-core.
//!
//! Provides a unified error type that maps onto result status codes.

use swapper_protocol::{DecodeError, EncodeError, status};
use thiserror::Error;

use crate::model::ModelError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Result type using SwapperError
pub type Result<T> = std::result::Result<T, SwapperError>;

/// Errors surfaced by the swapper interface, archiver and runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SwapperError {
    /// The model (its input queue, checkpoint or definition) does not exist.
    #[error("Model '{model_id}' not found")]
    ModelNotFound {
        /// The model ID that was not found.
        model_id: String,
    },

    /// A different definition is already stored under this model ID.
    #[error("Model '{model_id}' already exists")]
    ModelAlreadyExists {
        /// The conflicting model ID.
        model_id: String,
    },

    /// A queue required by the operation does not exist.
    #[error("Queue '{queue}' not found")]
    QueueNotFound {
        /// The missing queue name.
        queue: String,
    },

    /// A command carried invalid arguments or an unknown method.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A message could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A message could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The queue backend failed.
    #[error("Queue error: {0}")]
    Queue(QueueError),

    /// The checkpoint store failed.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// The model failed to build, run or snapshot.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl SwapperError {
    /// Status code reported in failure results for this error.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::ModelNotFound { .. } => status::ERR_NO_SUCH_MODEL,
            Self::ModelAlreadyExists { .. } => status::ERR_MODEL_ALREADY_EXISTS,
            Self::InvalidArgument(_) | Self::Model(ModelError::Definition(_)) => {
                status::ERR_INVALID_ARG
            }
            _ => status::ERR,
        }
    }

    /// Whether this error belongs to the not-found class.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. } | Self::QueueNotFound { .. }
        )
    }
}

impl From<QueueError> for SwapperError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(queue) => SwapperError::QueueNotFound { queue },
            other => SwapperError::Queue(other),
        }
    }
}

impl From<StoreError> for SwapperError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ModelNotFound(model_id) => SwapperError::ModelNotFound { model_id },
            StoreError::ModelAlreadyExists(model_id) => {
                SwapperError::ModelAlreadyExists { model_id }
            }
            other => SwapperError::Store(other),
        }
    }
}

/// Render an error and its source chain, keeping at most `max_len` trailing
/// characters.
pub fn error_trace(err: &(dyn std::error::Error + 'static), max_len: usize) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        // Skip causes already spelled out by the error that wraps them.
        let text = cause.to_string();
        if !trace.contains(&text) {
            trace.push_str("\ncaused by: ");
            trace.push_str(&text);
        }
        source = cause.source();
    }

    let total = trace.chars().count();
    if total <= max_len {
        return trace;
    }
    trace.chars().skip(total - max_len).collect()
}
