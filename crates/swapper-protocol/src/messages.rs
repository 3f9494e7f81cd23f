// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and result objects carried in model swapper batches.
//!
//! Requests flow from producers to a model's input queue; results flow from the
//! model runner to the shared results queue. Both are closed sum types so that
//! every dispatch point can match exhaustively.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Result status codes shared by command and inference results.
pub mod status {
    /// The request was processed successfully.
    pub const SUCCESS: i32 = 0;
    /// Generic failure.
    pub const ERR: i32 = 1;
    /// The request carried an invalid argument or unknown method.
    pub const ERR_INVALID_ARG: i32 = 2;
    /// The target model does not exist.
    pub const ERR_NO_SUCH_MODEL: i32 = 3;
    /// A conflicting model definition already exists.
    pub const ERR_MODEL_ALREADY_EXISTS: i32 = 4;
}

/// A single scalar value in an input row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value. Must be finite to be encoded.
    Float(f64),
    /// Text value.
    Text(String),
    /// Naive timestamp with microsecond precision.
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Numeric view of the value, coercing integers to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::DateTime(_) => "datetime",
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

/// Command methods understood by the model runner.
///
/// Unrecognized method names are preserved in `Other` so the runner can answer
/// them with an invalid-argument result instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandMethod {
    /// Persist a new model definition.
    DefineModel,
    /// Remove the model checkpoint and its input queue.
    DeleteModel,
    /// Copy the model checkpoint to a new model ID.
    CloneModel,
    /// Any other method name.
    Other(String),
}

impl CommandMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &str {
        match self {
            Self::DefineModel => "defineModel",
            Self::DeleteModel => "deleteModel",
            Self::CloneModel => "cloneModel",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for CommandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CommandMethod {
    fn from(name: &str) -> Self {
        match name {
            "defineModel" => Self::DefineModel,
            "deleteModel" => Self::DeleteModel,
            "cloneModel" => Self::CloneModel,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for CommandMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// A control command addressed to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Caller-supplied identifier used to correlate the result.
    pub command_id: String,
    /// The command to execute.
    pub method: CommandMethod,
    /// Optional command arguments.
    pub args: Option<Map<String, Value>>,
}

impl Command {
    /// Create a command.
    pub fn new(
        command_id: impl Into<String>,
        method: CommandMethod,
        args: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            method,
            args,
        }
    }
}

/// A row of input data to run through the model.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    /// Caller-supplied row identifier.
    pub row_id: i64,
    /// Field values in input-schema order.
    pub data: Vec<FieldValue>,
}

impl InputRow {
    /// Create an input row.
    pub fn new(row_id: i64, data: Vec<FieldValue>) -> Self {
        Self { row_id, data }
    }
}

/// Objects carried in a request batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Control command.
    Command(Command),
    /// Inference input.
    InputRow(InputRow),
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<InputRow> for Request {
    fn from(row: InputRow) -> Self {
        Self::InputRow(row)
    }
}

fn failure_code(code: i32) -> i32 {
    if code == status::SUCCESS {
        status::ERR
    } else {
        code
    }
}

/// Outcome of a command.
///
/// `args` is populated only on success and `error_message` only on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// Identifier of the originating command.
    pub command_id: String,
    /// Method of the originating command.
    pub method: CommandMethod,
    /// Zero on success, otherwise one of the [`status`] error codes.
    pub status: i32,
    /// Result arguments (success only).
    pub args: Option<Map<String, Value>>,
    /// Failure description (failure only).
    pub error_message: Option<String>,
}

impl CommandResult {
    /// Successful command result.
    pub fn success(
        command_id: impl Into<String>,
        method: CommandMethod,
        args: Map<String, Value>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            method,
            status: status::SUCCESS,
            args: Some(args),
            error_message: None,
        }
    }

    /// Failed command result. A zero `code` is replaced with [`status::ERR`].
    pub fn failure(
        command_id: impl Into<String>,
        method: CommandMethod,
        code: i32,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            method,
            status: failure_code(code),
            args: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }
}

/// Outcome of running one input row.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    /// Identifier of the originating row.
    pub row_id: i64,
    /// Zero on success, otherwise one of the [`status`] error codes.
    pub status: i32,
    /// Computed anomaly score (success only).
    pub anomaly_score: Option<f64>,
    /// Failure description (failure only).
    pub error_message: Option<String>,
}

impl InferenceResult {
    /// Successful inference result.
    pub fn success(row_id: i64, anomaly_score: f64) -> Self {
        Self {
            row_id,
            status: status::SUCCESS,
            anomaly_score: Some(anomaly_score),
            error_message: None,
        }
    }

    /// Failed inference result. A zero `code` is replaced with [`status::ERR`].
    pub fn failure(row_id: i64, code: i32, error_message: impl Into<String>) -> Self {
        Self {
            row_id,
            status: failure_code(code),
            anomaly_score: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Whether inference succeeded.
    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }
}

/// Objects carried in a result batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResult {
    /// Outcome of a command.
    Command(CommandResult),
    /// Outcome of an input row.
    Inference(InferenceResult),
}

impl From<CommandResult> for ModelResult {
    fn from(result: CommandResult) -> Self {
        Self::Command(result)
    }
}

impl From<InferenceResult> for ModelResult {
    fn from(result: InferenceResult) -> Self {
        Self::Inference(result)
    }
}
