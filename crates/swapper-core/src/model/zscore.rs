// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in streaming z-score model.
//!
//! Tracks a running mean and variance (Welford) of one numeric field. A record
//! is scored against the statistics seen *before* it, then folded in:
//!
//! ```text
//! z     = |x - mean| / max(std, min_std)
//! score = 1 - exp(-z² / 2)
//! ```
//!
//! Scores stay at 0 until two values have been observed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnomalyModel, FieldType, ModelDefinition, ModelError, ModelFactory, ModelRecord};

const DEFAULT_MIN_STD: f64 = 1e-9;

/// Welford state of the z-score model, also its snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZScoreModel {
    value_field: String,
    min_std: f64,
    count: u64,
    mean: f64,
    m2: f64,
}

impl ZScoreModel {
    pub fn new(value_field: impl Into<String>, min_std: f64) -> Self {
        Self {
            value_field: value_field.into(),
            min_std,
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Build from a definition: the scored field is
    /// `inferenceArgs.inputPredictedField`, else the first numeric schema field.
    pub fn from_definition(definition: &ModelDefinition) -> Result<Self, ModelError> {
        let value_field = match definition
            .inference_args
            .get("inputPredictedField")
            .and_then(Value::as_str)
        {
            Some(name) => name.to_string(),
            None => definition
                .input_schema
                .iter()
                .find(|meta| matches!(meta.field_type, FieldType::Float | FieldType::Int))
                .map(|meta| meta.name.clone())
                .ok_or_else(|| {
                    ModelError::Definition("schema has no numeric field to score".to_string())
                })?,
        };

        let min_std = definition
            .model_config
            .get("minStd")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_MIN_STD);

        Ok(Self::new(value_field, min_std))
    }

    /// Number of values folded into the statistics.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.m2.is_finite() && self.min_std.is_finite()
    }

    fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

impl AnomalyModel for ZScoreModel {
    fn run(&mut self, record: &ModelRecord) -> Result<f64, ModelError> {
        let value = record
            .get(&self.value_field)
            .ok_or_else(|| {
                ModelError::InvalidInput(format!("record has no field '{}'", self.value_field))
            })?
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ModelError::InvalidInput(format!(
                    "field '{}' is not a finite number",
                    self.value_field
                ))
            })?;

        let score = if self.count < 2 {
            0.0
        } else {
            let z = (value - self.mean).abs() / self.std_dev().max(self.min_std);
            1.0 - (-z * z / 2.0).exp()
        };

        let count = self.count + 1;
        let delta = value - self.mean;
        let mean = self.mean + delta / count as f64;
        let m2 = self.m2 + delta * (value - mean);
        if !mean.is_finite() || !m2.is_finite() {
            return Err(ModelError::InvalidInput(format!(
                "field '{}' value {value} overflows the running statistics",
                self.value_field
            )));
        }

        self.count = count;
        self.mean = mean;
        self.m2 = m2;
        Ok(score)
    }

    fn snapshot(&self) -> Result<Vec<u8>, ModelError> {
        // JSON has no encoding for non-finite floats.
        if !self.is_finite() {
            return Err(ModelError::InvalidInput(
                "model statistics are not finite".to_string(),
            ));
        }
        Ok(serde_json::to_vec(self)?)
    }
}

/// Factory for the models shipped with this crate.
///
/// `modelConfig.modelType` selects the kind; only `"zscore"` exists and is the
/// default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinModelFactory;

impl BuiltinModelFactory {
    fn check_type(definition: &ModelDefinition) -> Result<(), ModelError> {
        match definition
            .model_config
            .get("modelType")
            .and_then(Value::as_str)
        {
            None | Some("zscore") => Ok(()),
            Some(other) => Err(ModelError::UnsupportedModel(other.to_string())),
        }
    }
}

impl ModelFactory for BuiltinModelFactory {
    fn create(&self, definition: &ModelDefinition) -> Result<Box<dyn AnomalyModel>, ModelError> {
        Self::check_type(definition)?;
        Ok(Box::new(ZScoreModel::from_definition(definition)?))
    }

    fn restore(
        &self,
        definition: &ModelDefinition,
        snapshot: &[u8],
    ) -> Result<Box<dyn AnomalyModel>, ModelError> {
        Self::check_type(definition)?;
        let model: ZScoreModel = serde_json::from_slice(snapshot)?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, RowConverter};
    use serde_json::json;
    use swapper_protocol::FieldValue;

    fn definition() -> ModelDefinition {
        ModelDefinition {
            model_config: json!({"modelType": "zscore"}),
            inference_args: json!({"inputPredictedField": "value"}),
            input_schema: vec![
                FieldMeta::new("label", FieldType::String),
                FieldMeta::new("value", FieldType::Float),
            ],
        }
    }

    fn record(value: f64) -> ModelRecord {
        RowConverter::new(definition().input_schema)
            .convert(&[FieldValue::Text("x".into()), FieldValue::Float(value)])
            .unwrap()
    }

    #[test]
    fn test_scores_outlier_higher() {
        let mut model = ZScoreModel::from_definition(&definition()).unwrap();
        for v in [10.0, 11.0, 9.0, 10.5, 9.5, 10.0] {
            model.run(&record(v)).unwrap();
        }
        let normal = model.clone().run(&record(10.2)).unwrap();
        let outlier = model.run(&record(50.0)).unwrap();
        assert!(outlier > 0.99, "outlier score {outlier}");
        assert!(normal < outlier);
    }

    #[test]
    fn test_first_scores_are_zero() {
        let mut model = ZScoreModel::new("value", DEFAULT_MIN_STD);
        assert_eq!(model.run(&record(1.0)).unwrap(), 0.0);
        assert_eq!(model.run(&record(100.0)).unwrap(), 0.0);
        assert_eq!(model.count(), 2);
    }

    #[test]
    fn test_null_value_is_rejected_without_state_change() {
        let mut model = ZScoreModel::new("value", DEFAULT_MIN_STD);
        let null_row = RowConverter::new(definition().input_schema)
            .convert(&[FieldValue::Null, FieldValue::Null])
            .unwrap();
        assert!(matches!(
            model.run(&null_row).unwrap_err(),
            ModelError::InvalidInput(_)
        ));
        assert_eq!(model.count(), 0);
    }

    #[test]
    fn test_overflowing_value_is_rejected_without_state_change() {
        let mut model = ZScoreModel::new("value", DEFAULT_MIN_STD);
        model.run(&record(1.0)).unwrap();
        let before = model.clone();

        let err = model.run(&record(1e200)).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
        assert_eq!(model, before);

        model.run(&record(2.0)).unwrap();
        let snapshot = model.snapshot().unwrap();
        let mut restored = BuiltinModelFactory
            .restore(&definition(), &snapshot)
            .unwrap();
        let expected = model.run(&record(3.0)).unwrap();
        assert!(expected > 0.0);
        assert_eq!(restored.run(&record(3.0)).unwrap(), expected);
    }

    #[test]
    fn test_snapshot_refuses_non_finite_state() {
        let mut model = ZScoreModel::new("value", DEFAULT_MIN_STD);
        model.m2 = f64::INFINITY;
        assert!(matches!(
            model.snapshot().unwrap_err(),
            ModelError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_snapshot_restore_preserves_state() {
        let factory = BuiltinModelFactory;
        let mut model = factory.create(&definition()).unwrap();
        for v in [1.0, 2.0, 3.0] {
            model.run(&record(v)).unwrap();
        }
        let snapshot = model.snapshot().unwrap();

        let mut restored = factory.restore(&definition(), &snapshot).unwrap();
        assert_eq!(
            model.run(&record(7.0)).unwrap(),
            restored.run(&record(7.0)).unwrap()
        );
    }

    #[test]
    fn test_field_defaults_to_first_numeric() {
        let mut definition = definition();
        definition.inference_args = Value::Null;
        let model = ZScoreModel::from_definition(&definition).unwrap();
        assert_eq!(model.value_field, "value");
    }

    #[test]
    fn test_unknown_model_type() {
        let mut definition = definition();
        definition.model_config = json!({"modelType": "htm"});
        let err = BuiltinModelFactory.create(&definition).err().unwrap();
        assert!(matches!(err, ModelError::UnsupportedModel(t) if t == "htm"));
    }
}
