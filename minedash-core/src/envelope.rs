//! Pub/Sub push envelope decoding.
//!
//! Two shapes are accepted:
//! - push form: `{"message": {"data": "<base64>", "messageId": ..., ...}, "subscription": ...}`
//! - direct form: `{"data": "<json text>"}`, where a missing `data` means `{}`
//!
//! The presence of the `message` key selects the push form.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::EnvelopeError;

/// Which wrapper the payload arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeForm {
    Push,
    Direct,
}

/// The decoded `data` text plus delivery metadata useful for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub data: String,
    pub form: EnvelopeForm,
    pub message_id: Option<String>,
    pub publish_time: Option<String>,
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: Option<Value>,
    message_id: Option<String>,
    publish_time: Option<String>,
}

/// Decode a raw request body into the sensor payload text.
pub fn decode_envelope(body: &[u8]) -> Result<DecodedPayload, EnvelopeError> {
    let envelope: Value = serde_json::from_slice(body)?;
    let envelope = match envelope {
        Value::Object(map) => map,
        other => {
            return Err(EnvelopeError::Shape(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    match envelope.get("message") {
        Some(message) => decode_push(message, &envelope),
        None => decode_direct(&envelope),
    }
}

fn decode_push(message: &Value, envelope: &Map<String, Value>) -> Result<DecodedPayload, EnvelopeError> {
    if !message.is_object() {
        return Err(EnvelopeError::Shape(format!(
            "message must be an object, got {}",
            json_kind(message)
        )));
    }
    let message: PushMessage = serde_json::from_value(message.clone())?;

    let encoded = match message.data {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(EnvelopeError::Shape(format!(
                "message.data must be a string, got {}",
                json_kind(&other)
            )))
        }
        None => return Err(EnvelopeError::Shape("message.data is missing".to_string())),
    };

    let bytes = STANDARD.decode(encoded.trim())?;
    let data = String::from_utf8(bytes)?;

    Ok(DecodedPayload {
        data,
        form: EnvelopeForm::Push,
        message_id: message.message_id,
        publish_time: message.publish_time,
        subscription: envelope
            .get("subscription")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn decode_direct(envelope: &Map<String, Value>) -> Result<DecodedPayload, EnvelopeError> {
    let data = match envelope.get("data") {
        None => "{}".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(EnvelopeError::Shape(format!(
                "data must be a string, got {}",
                json_kind(other)
            )))
        }
    };

    Ok(DecodedPayload {
        data,
        form: EnvelopeForm::Direct,
        message_id: None,
        publish_time: None,
        subscription: None,
    })
}

/// Wrap payload text in a push-form envelope, as Pub/Sub would deliver it.
pub fn encode_push_envelope(data: &str) -> Value {
    serde_json::json!({
        "message": {
            "data": STANDARD.encode(data.as_bytes()),
        }
    })
}

/// Wrap payload text in a direct-form envelope.
pub fn encode_direct_envelope(data: &str) -> Value {
    serde_json::json!({ "data": data })
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
