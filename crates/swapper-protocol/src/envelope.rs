// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message envelopes.
//!
//! A message body is the routing identifier, a single `\n`, and the marshaled
//! batch:
//! - request message: `batch_id + "\n" + batch`
//! - result message: `model_id + "\n" + batch`
//!
//! Only the first delimiter is significant; the batch may contain further
//! newline bytes in principle.

use bytes::Bytes;

use crate::codec::{DecodeError, EncodeError, marshal_batch, unmarshal_batch};
use crate::messages::{ModelResult, Request};

/// Routing delimiter between the identifier and the batch.
pub const DELIMITER: u8 = b'\n';

/// Prefix marshaled batch bytes with a routing identifier.
pub fn marshal_message(id: &str, batch: &[u8]) -> Result<Bytes, EncodeError> {
    if id.as_bytes().contains(&DELIMITER) {
        return Err(EncodeError::InvalidRoutingId(id.to_string()));
    }
    let mut body = Vec::with_capacity(id.len() + 1 + batch.len());
    body.extend_from_slice(id.as_bytes());
    body.push(DELIMITER);
    body.extend_from_slice(batch);
    Ok(Bytes::from(body))
}

/// Split a message body into its routing identifier and batch bytes.
pub fn unmarshal_message(body: &[u8]) -> Result<(String, &[u8]), DecodeError> {
    let split = body
        .iter()
        .position(|b| *b == DELIMITER)
        .ok_or(DecodeError::MissingDelimiter)?;
    let id = std::str::from_utf8(&body[..split]).map_err(|_| DecodeError::InvalidRoutingId)?;
    Ok((id.to_string(), &body[split + 1..]))
}

/// A batch of requests addressed to one model's input queue.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBatch {
    /// Unique batch token used for duplicate suppression.
    pub batch_id: String,
    /// Requests in submission order.
    pub requests: Vec<Request>,
}

impl RequestBatch {
    /// Encode as a request message body.
    pub fn to_message(&self) -> Result<Bytes, EncodeError> {
        marshal_message(&self.batch_id, &marshal_batch(&self.requests)?)
    }

    /// Decode a request message body.
    pub fn from_message(body: &[u8]) -> Result<Self, DecodeError> {
        let (batch_id, batch) = unmarshal_message(body)?;
        Ok(Self {
            batch_id,
            requests: unmarshal_batch(batch)?,
        })
    }
}

/// A batch of results emitted by one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    /// Model that produced the results.
    pub model_id: String,
    /// Results in request order.
    pub results: Vec<ModelResult>,
}

impl ResultBatch {
    /// Encode as a result message body.
    pub fn to_message(&self) -> Result<Bytes, EncodeError> {
        marshal_message(&self.model_id, &marshal_batch(&self.results)?)
    }

    /// Decode a result message body.
    pub fn from_message(body: &[u8]) -> Result<Self, DecodeError> {
        let (model_id, batch) = unmarshal_message(body)?;
        Ok(Self {
            model_id,
            results: unmarshal_batch(batch)?,
        })
    }
}

/// Encode a scheduler notification: the model ID as a JSON string.
pub fn marshal_scheduler_notification(model_id: &str) -> Result<Bytes, EncodeError> {
    Ok(Bytes::from(serde_json::to_vec(model_id)?))
}

/// Decode a scheduler notification body.
pub fn unmarshal_scheduler_notification(body: &[u8]) -> Result<String, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_first_delimiter_only() {
        let body = marshal_message("batch-1", b"abc\ndef").unwrap();
        let (id, rest) = unmarshal_message(&body).unwrap();
        assert_eq!(id, "batch-1");
        assert_eq!(rest, b"abc\ndef");
    }

    #[test]
    fn test_routing_id_with_newline_rejected() {
        let err = marshal_message("a\nb", b"[]").unwrap_err();
        assert!(matches!(err, EncodeError::InvalidRoutingId(_)));
    }

    #[test]
    fn test_missing_delimiter() {
        let err = unmarshal_message(b"no-delimiter").unwrap_err();
        assert!(matches!(err, DecodeError::MissingDelimiter));
    }

    #[test]
    fn test_scheduler_notification_is_quoted() {
        let body = marshal_scheduler_notification("model-1").unwrap();
        assert_eq!(&body[..], br#""model-1""#);
        assert_eq!(unmarshal_scheduler_notification(&body).unwrap(), "model-1");
    }
}
