// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input record schema and row conversion.

use serde::{Deserialize, Serialize};
use swapper_protocol::FieldValue;

use super::ModelError;

/// Declared type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Datetime,
    Float,
    Int,
    String,
    Bool,
}

impl FieldType {
    /// Coerce a value to this type. Null passes through.
    fn coerce(self, value: &FieldValue) -> Option<FieldValue> {
        match (self, value) {
            (_, FieldValue::Null) => Some(FieldValue::Null),
            (FieldType::Datetime, FieldValue::DateTime(_))
            | (FieldType::Float, FieldValue::Float(_))
            | (FieldType::Int, FieldValue::Int(_))
            | (FieldType::String, FieldValue::Text(_))
            | (FieldType::Bool, FieldValue::Bool(_)) => Some(value.clone()),
            (FieldType::Float, FieldValue::Int(i)) => Some(FieldValue::Float(*i as f64)),
            _ => None,
        }
    }
}

/// One field of an input record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Optional role marker, e.g. `"timestamp"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            special: None,
        }
    }
}

/// A typed record ready to be fed to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ModelRecord {
    /// Value of a named field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Fields in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Converts raw input rows into [`ModelRecord`]s according to a schema.
#[derive(Debug, Clone)]
pub struct RowConverter {
    schema: Vec<FieldMeta>,
}

impl RowConverter {
    pub fn new(schema: Vec<FieldMeta>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &[FieldMeta] {
        &self.schema
    }

    pub fn convert(&self, data: &[FieldValue]) -> Result<ModelRecord, ModelError> {
        if data.len() != self.schema.len() {
            return Err(ModelError::InvalidInput(format!(
                "expected {} fields, got {}",
                self.schema.len(),
                data.len()
            )));
        }

        let fields = self
            .schema
            .iter()
            .zip(data)
            .map(|(meta, value)| {
                meta.field_type
                    .coerce(value)
                    .map(|coerced| (meta.name.clone(), coerced))
                    .ok_or_else(|| {
                        ModelError::InvalidInput(format!(
                            "field '{}' expects {:?}, got {}",
                            meta.name,
                            meta.field_type,
                            value.kind()
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ModelRecord { fields })
    }
}
