// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swapper Protocol - request/result batches for the model swapper
//!
//! This crate defines the objects exchanged between producers, model runners
//! and the results consumer, and their wire encoding.
//!
//! # Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     swapper-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: routing id + "\n" + batch                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Batch codec: tagged positional JSON arrays                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: Request / ModelResult sum types                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use swapper_protocol::{InputRow, Request, RequestBatch};
//!
//! let batch = RequestBatch {
//!     batch_id: "b-1".to_string(),
//!     requests: vec![Request::InputRow(InputRow::new(1, vec![1.5.into()]))],
//! };
//! let body = batch.to_message().unwrap();
//! assert_eq!(RequestBatch::from_message(&body).unwrap(), batch);
//! ```

pub mod codec;
pub mod envelope;
pub mod messages;

pub use codec::{
    BatchObject, DecodeError, EncodeError, field_from_wire, field_to_wire, marshal_batch,
    unmarshal_batch,
};
pub use envelope::{
    RequestBatch, ResultBatch, marshal_message, marshal_scheduler_notification,
    unmarshal_message, unmarshal_scheduler_notification,
};
pub use messages::{
    Command, CommandMethod, CommandResult, FieldValue, InferenceResult, InputRow, ModelResult,
    Request, status,
};
