use thiserror::Error;

/// Failures decoding the inbound push/direct envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    Shape(String),

    #[error("Invalid base64 in message.data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("message.data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Failures turning decoded text into a reading or a row.
#[derive(Error, Debug)]
pub enum ReadingError {
    #[error("Invalid sensor reading JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Sensor reading must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("could not convert value to float: {0}")]
    Coercion(String),
}

/// Failures obtaining an OAuth access token.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metadata server returned {code}: {message}")]
    Metadata { code: u16, message: String },
}

/// Failures calling the generative model.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Access token unavailable: {0}")]
    Auth(#[from] AuthError),

    #[error("Unknown model backend: {0}")]
    UnknownBackend(String),

    #[error("All {attempts} model call attempts failed: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

/// Failures of the warehouse append call itself (not per-row errors).
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BigQuery API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Access token unavailable: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, serde::Deserialize)]
struct GoogleErrorResponse {
    error: Option<GoogleErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
struct GoogleErrorDetail {
    code: u16,
    message: String,
}

/// Extract `(code, message)` from a Google API error body, falling back to the
/// HTTP status and raw body when it is not the standard shape.
pub(crate) fn google_error_parts(status: u16, body: String) -> (u16, String) {
    serde_json::from_str::<GoogleErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| (e.code, e.message))
        .unwrap_or((status, body))
}
