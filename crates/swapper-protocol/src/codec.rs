// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch codec.
//!
//! A batch is encoded as a compact JSON array. Each element is itself an array
//! whose first entry is a short type tag followed by the object's fields in a
//! fixed positional order:
//!
//! | Tag      | Fields                                                  |
//! |----------|---------------------------------------------------------|
//! | `cmd`    | command_id, method, args                                |
//! | `row`    | row_id, data                                            |
//! | `cmdres` | command_id, method, status, args, error_message         |
//! | `infres` | row_id, status, anomaly_score, error_message            |
//!
//! Datetimes are encoded as `{"__datetime__": [epoch_seconds, microseconds]}`.
//! Compact JSON never contains a raw newline, which keeps batches safe inside
//! newline-delimited message envelopes.

use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::messages::{
    Command, CommandMethod, CommandResult, FieldValue, InferenceResult, InputRow, ModelResult,
    Request, status,
};

/// Tag of [`Command`] objects.
pub const TAG_COMMAND: &str = "cmd";
/// Tag of [`InputRow`] objects.
pub const TAG_INPUT_ROW: &str = "row";
/// Tag of [`CommandResult`] objects.
pub const TAG_COMMAND_RESULT: &str = "cmdres";
/// Tag of [`InferenceResult`] objects.
pub const TAG_INFERENCE_RESULT: &str = "infres";

const DATETIME_KEY: &str = "__datetime__";

/// Errors raised while encoding a batch.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("batch must contain at least one object")]
    EmptyBatch,

    #[error("float value {0} cannot be encoded")]
    NonFiniteFloat(f64),

    #[error("routing id must not contain a newline: {0:?}")]
    InvalidRoutingId(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while decoding a batch or message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown object tag: {0:?}")]
    UnknownTag(String),

    #[error("malformed {object}: {reason}")]
    Malformed {
        object: &'static str,
        reason: String,
    },

    #[error("batch contains no objects")]
    EmptyBatch,

    #[error("message has no routing delimiter")]
    MissingDelimiter,

    #[error("routing id is not valid UTF-8")]
    InvalidRoutingId,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn malformed(object: &'static str, reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        object,
        reason: reason.into(),
    }
}

/// An object that can travel inside a batch.
pub trait BatchObject: Sized {
    /// Encode to the tagged positional form.
    fn to_wire(&self) -> Result<Value, EncodeError>;

    /// Decode from the tagged positional form.
    fn from_wire(value: Value) -> Result<Self, DecodeError>;
}

/// Serialize an ordered, non-empty sequence of objects.
pub fn marshal_batch<T: BatchObject>(objects: &[T]) -> Result<Vec<u8>, EncodeError> {
    if objects.is_empty() {
        return Err(EncodeError::EmptyBatch);
    }
    let items = objects
        .iter()
        .map(BatchObject::to_wire)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_vec(&Value::Array(items))?)
}

/// Deserialize a batch produced by [`marshal_batch`].
///
/// Any malformed or unrecognized object fails the whole batch.
pub fn unmarshal_batch<T: BatchObject>(bytes: &[u8]) -> Result<Vec<T>, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Array(items) = value else {
        return Err(malformed("batch", "expected an array"));
    };
    if items.is_empty() {
        return Err(DecodeError::EmptyBatch);
    }
    items.into_iter().map(T::from_wire).collect()
}

// ============================================================================
// Field values
// ============================================================================

/// Encode a single field value.
pub fn field_to_wire(value: &FieldValue) -> Result<Value, EncodeError> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(v) => Value::Bool(*v),
        FieldValue::Int(v) => Value::Number((*v).into()),
        FieldValue::Float(v) => float_to_wire(*v)?,
        FieldValue::Text(v) => Value::String(v.clone()),
        FieldValue::DateTime(dt) => {
            let utc = dt.and_utc();
            let mut obj = Map::new();
            obj.insert(
                DATETIME_KEY.to_string(),
                Value::Array(vec![
                    Value::Number(utc.timestamp().into()),
                    Value::Number(((dt.nanosecond() % 1_000_000_000) / 1_000).into()),
                ]),
            );
            Value::Object(obj)
        }
    })
}

/// Decode a single field value.
pub fn field_from_wire(value: Value) -> Result<FieldValue, DecodeError> {
    Ok(match value {
        Value::Null => FieldValue::Null,
        Value::Bool(v) => FieldValue::Bool(v),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                FieldValue::Int(v)
            } else if n.is_f64() {
                FieldValue::Float(n.as_f64().unwrap_or_default())
            } else {
                return Err(malformed("field", format!("integer out of range: {}", n)));
            }
        }
        Value::String(v) => FieldValue::Text(v),
        Value::Object(mut obj) => {
            let Some(Value::Array(parts)) = obj.remove(DATETIME_KEY) else {
                return Err(malformed("field", "unsupported object value"));
            };
            FieldValue::DateTime(datetime_from_parts(&parts)?)
        }
        Value::Array(_) => return Err(malformed("field", "unsupported array value")),
    })
}

fn datetime_from_parts(parts: &[Value]) -> Result<NaiveDateTime, DecodeError> {
    let [secs, micros] = parts else {
        return Err(malformed("datetime", "expected [seconds, microseconds]"));
    };
    let secs = secs
        .as_i64()
        .ok_or_else(|| malformed("datetime", "seconds must be an integer"))?;
    let micros = micros
        .as_u64()
        .filter(|m| *m < 1_000_000)
        .ok_or_else(|| malformed("datetime", "microseconds must be in 0..1000000"))?;
    DateTime::from_timestamp(secs, (micros * 1_000) as u32)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| malformed("datetime", "timestamp out of range"))
}

fn float_to_wire(v: f64) -> Result<Value, EncodeError> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or(EncodeError::NonFiniteFloat(v))
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        field_to_wire(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        field_from_wire(value).map_err(D::Error::custom)
    }
}

// ============================================================================
// Positional field helpers
// ============================================================================

struct Fields {
    object: &'static str,
    items: std::vec::IntoIter<Value>,
}

impl Fields {
    fn new(object: &'static str, items: Vec<Value>, expected: usize) -> Result<Self, DecodeError> {
        if items.len() != expected {
            return Err(malformed(
                object,
                format!("expected {} fields, got {}", expected, items.len()),
            ));
        }
        Ok(Self {
            object,
            items: items.into_iter(),
        })
    }

    fn next(&mut self) -> Value {
        self.items.next().unwrap_or(Value::Null)
    }

    fn string(&mut self, name: &str) -> Result<String, DecodeError> {
        match self.next() {
            Value::String(s) => Ok(s),
            other => Err(malformed(
                self.object,
                format!("{} must be a string, got {}", name, other),
            )),
        }
    }

    fn opt_string(&mut self, name: &str) -> Result<Option<String>, DecodeError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(malformed(
                self.object,
                format!("{} must be a string or null, got {}", name, other),
            )),
        }
    }

    fn int(&mut self, name: &str) -> Result<i64, DecodeError> {
        let value = self.next();
        value.as_i64().ok_or_else(|| {
            malformed(
                self.object,
                format!("{} must be an integer, got {}", name, value),
            )
        })
    }

    fn status(&mut self) -> Result<i32, DecodeError> {
        let value = self.int("status")?;
        i32::try_from(value).map_err(|_| malformed(self.object, "status out of range"))
    }

    fn opt_float(&mut self, name: &str) -> Result<Option<f64>, DecodeError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            other => Err(malformed(
                self.object,
                format!("{} must be a number or null, got {}", name, other),
            )),
        }
    }

    fn opt_map(&mut self, name: &str) -> Result<Option<Map<String, Value>>, DecodeError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            other => Err(malformed(
                self.object,
                format!("{} must be an object or null, got {}", name, other),
            )),
        }
    }
}

fn opt_map_to_wire(map: &Option<Map<String, Value>>) -> Value {
    map.clone().map(Value::Object).unwrap_or(Value::Null)
}

fn opt_string_to_wire(s: &Option<String>) -> Value {
    s.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Split a tagged wire object into its tag and positional fields.
fn split_tag(value: Value) -> Result<(String, Vec<Value>), DecodeError> {
    let Value::Array(mut items) = value else {
        return Err(malformed("object", "expected a tagged array"));
    };
    if items.is_empty() {
        return Err(malformed("object", "missing type tag"));
    }
    match items.remove(0) {
        Value::String(tag) => Ok((tag, items)),
        other => Err(malformed("object", format!("type tag must be a string, got {}", other))),
    }
}

fn check_outcome(
    object: &'static str,
    status_code: i32,
    has_payload: bool,
    has_error: bool,
) -> Result<(), DecodeError> {
    let consistent = if status_code == status::SUCCESS {
        has_payload && !has_error
    } else {
        !has_payload && has_error
    };
    if consistent {
        Ok(())
    } else {
        Err(malformed(
            object,
            format!("payload/error fields do not match status {}", status_code),
        ))
    }
}

// ============================================================================
// Requests
// ============================================================================

impl BatchObject for Request {
    fn to_wire(&self) -> Result<Value, EncodeError> {
        Ok(match self {
            Request::Command(cmd) => Value::Array(vec![
                Value::String(TAG_COMMAND.to_string()),
                Value::String(cmd.command_id.clone()),
                Value::String(cmd.method.as_str().to_string()),
                opt_map_to_wire(&cmd.args),
            ]),
            Request::InputRow(row) => {
                let data = row
                    .data
                    .iter()
                    .map(field_to_wire)
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(vec![
                    Value::String(TAG_INPUT_ROW.to_string()),
                    Value::Number(row.row_id.into()),
                    Value::Array(data),
                ])
            }
        })
    }

    fn from_wire(value: Value) -> Result<Self, DecodeError> {
        let (tag, items) = split_tag(value)?;
        match tag.as_str() {
            TAG_COMMAND => {
                let mut f = Fields::new("command", items, 3)?;
                let command_id = f.string("command_id")?;
                let method = CommandMethod::from(f.string("method")?.as_str());
                let args = f.opt_map("args")?;
                Ok(Request::Command(Command {
                    command_id,
                    method,
                    args,
                }))
            }
            TAG_INPUT_ROW => {
                let mut f = Fields::new("input row", items, 2)?;
                let row_id = f.int("row_id")?;
                let Value::Array(raw) = f.next() else {
                    return Err(malformed("input row", "data must be an array"));
                };
                if raw.is_empty() {
                    return Err(malformed("input row", "data must not be empty"));
                }
                let data = raw
                    .into_iter()
                    .map(field_from_wire)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Request::InputRow(InputRow { row_id, data }))
            }
            _ => Err(DecodeError::UnknownTag(tag)),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

impl BatchObject for ModelResult {
    fn to_wire(&self) -> Result<Value, EncodeError> {
        Ok(match self {
            ModelResult::Command(res) => Value::Array(vec![
                Value::String(TAG_COMMAND_RESULT.to_string()),
                Value::String(res.command_id.clone()),
                Value::String(res.method.as_str().to_string()),
                Value::Number(res.status.into()),
                opt_map_to_wire(&res.args),
                opt_string_to_wire(&res.error_message),
            ]),
            ModelResult::Inference(res) => Value::Array(vec![
                Value::String(TAG_INFERENCE_RESULT.to_string()),
                Value::Number(res.row_id.into()),
                Value::Number(res.status.into()),
                match res.anomaly_score {
                    Some(score) => float_to_wire(score)?,
                    None => Value::Null,
                },
                opt_string_to_wire(&res.error_message),
            ]),
        })
    }

    fn from_wire(value: Value) -> Result<Self, DecodeError> {
        let (tag, items) = split_tag(value)?;
        match tag.as_str() {
            TAG_COMMAND_RESULT => {
                let mut f = Fields::new("command result", items, 5)?;
                let command_id = f.string("command_id")?;
                let method = CommandMethod::from(f.string("method")?.as_str());
                let status_code = f.status()?;
                let args = f.opt_map("args")?;
                let error_message = f.opt_string("error_message")?;
                check_outcome(
                    "command result",
                    status_code,
                    args.is_some(),
                    error_message.is_some(),
                )?;
                Ok(ModelResult::Command(CommandResult {
                    command_id,
                    method,
                    status: status_code,
                    args,
                    error_message,
                }))
            }
            TAG_INFERENCE_RESULT => {
                let mut f = Fields::new("inference result", items, 4)?;
                let row_id = f.int("row_id")?;
                let status_code = f.status()?;
                let anomaly_score = f.opt_float("anomaly_score")?;
                let error_message = f.opt_string("error_message")?;
                check_outcome(
                    "inference result",
                    status_code,
                    anomaly_score.is_some(),
                    error_message.is_some(),
                )?;
                Ok(ModelResult::Inference(InferenceResult {
                    row_id,
                    status: status_code,
                    anomaly_score,
                    error_message,
                }))
            }
            _ => Err(DecodeError::UnknownTag(tag)),
        }
    }
}
