use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::envelope::json_kind;
use crate::error::ReadingError;

/// A sensor reading as published by the field gateways.
///
/// Every field is optional. Text fields accept numbers and booleans (rendered
/// to their JSON text) and treat `null` as empty. `value` is kept raw and only
/// coerced when the row is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorReading {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sensor_id: String,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub sensor_type: String,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
}

impl SensorReading {
    pub fn parse(data: &str) -> Result<Self, ReadingError> {
        let value: Value = serde_json::from_str(data)?;
        if !value.is_object() {
            return Err(ReadingError::NotAnObject(json_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The reading's value as a float; absent means `0.0`.
    pub fn numeric_value(&self) -> Result<f64, ReadingError> {
        match &self.value {
            None => Ok(0.0),
            Some(v) => coerce_value(v),
        }
    }
}

/// Coerce a JSON value to `f64`: numbers as-is, numeric strings parsed after
/// trimming, booleans as 1/0. Anything else is an error, and so is a result
/// that is not finite (JSON has no encoding for it).
pub fn coerce_value(value: &Value) -> Result<f64, ReadingError> {
    let coerced = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ReadingError::Coercion(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ReadingError::Coercion(format!("'{}'", s))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ReadingError::Coercion(json_kind(other).to_string())),
    }?;

    if coerced.is_finite() {
        Ok(coerced)
    } else {
        Err(ReadingError::Coercion(match value {
            Value::String(s) => format!("'{}'", s),
            other => other.to_string(),
        }))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// Keeps an explicit `null` distinguishable from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
