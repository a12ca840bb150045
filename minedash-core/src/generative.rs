//! Generative model access for MineDash.
//!
//! Provides a `GenerativeBackend` trait ("prompt in, text out") with one adapter
//! per Vertex AI call style:
//! - **vertex-predict**: `:predict` with `{"instances": [{"prompt": ...}]}`, verdict
//!   read from `predictions[0].content`
//! - **vertex-generate**: `:generateContent` with a single user turn, verdict is
//!   the first candidate's text

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::auth::AccessTokenProvider;
use crate::config::MinedashConfig;
use crate::error::{google_error_parts, GenerationError};

/// Verdict used when a prediction carries no `content`.
pub const NO_RESPONSE: &str = "No response";

// ============================================================================
// GenerativeBackend trait
// ============================================================================

/// Abstraction over the hosted model: submit prompt text, receive response text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Config types
// ============================================================================

/// Where and how to reach a Vertex AI publisher model.
#[derive(Debug, Clone)]
pub struct VertexConfig {
    /// e.g. `https://southamerica-west1-aiplatform.googleapis.com/v1`
    pub base_url: String,
    /// `projects/{p}/locations/{r}/publishers/google/models/{m}`
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl VertexConfig {
    pub fn from_config(config: &MinedashConfig) -> Self {
        Self {
            base_url: config.vertex_base_url(),
            endpoint: config.model_endpoint(),
            timeout: Duration::from_secs(config.model.timeout_seconds),
            max_retries: config.model.max_retries,
            retry_delay_ms: config.model.retry_delay_ms,
        }
    }
}

/// Create the backend named by `[model] backend`.
pub fn create_backend(
    config: &MinedashConfig,
    tokens: Arc<AccessTokenProvider>,
) -> Result<Box<dyn GenerativeBackend>, GenerationError> {
    let vertex = VertexConfig::from_config(config);
    match config.model.backend.as_str() {
        "vertex-predict" => Ok(Box::new(VertexPredictClient::new(vertex, tokens)?)),
        "vertex-generate" => Ok(Box::new(VertexGenerateClient::new(vertex, tokens)?)),
        other => Err(GenerationError::UnknownBackend(other.to_string())),
    }
}

// ============================================================================
// Shared transport
// ============================================================================

struct VertexTransport {
    client: Client,
    config: VertexConfig,
    tokens: Arc<AccessTokenProvider>,
}

impl VertexTransport {
    fn new(config: VertexConfig, tokens: Arc<AccessTokenProvider>) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    async fn call<B, R>(&self, verb: &str, body: &B) -> Result<R, GenerationError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.call_once(verb, body),
            |e: &GenerationError| {
                let retry = is_retryable(e);
                if retry && self.config.max_retries > 0 {
                    tracing::warn!(error = %e, verb = verb, "Model call failed, retrying");
                }
                retry
            },
        )
        .await;

        match result {
            Ok(r) => Ok(r),
            Err(e) if self.config.max_retries > 0 && is_retryable(&e) => {
                tracing::error!(
                    attempts = self.config.max_retries + 1,
                    error = %e,
                    "All model call attempts failed"
                );
                Err(GenerationError::RetryExhausted {
                    attempts: self.config.max_retries + 1,
                    last: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn call_once<B, R>(&self, verb: &str, body: &B) -> Result<R, GenerationError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}:{}", self.config.base_url, self.config.endpoint, verb);
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = google_error_parts(status.as_u16(), error_body);
            tracing::error!(code = code, message = %message, "Vertex AI error");
            return Err(GenerationError::Api { code, message });
        }

        Ok(response.json().await?)
    }
}

fn is_retryable(e: &GenerationError) -> bool {
    match e {
        GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
        GenerationError::Http(err) => err.is_timeout() || err.is_connect(),
        _ => false,
    }
}

// ============================================================================
// VertexPredictClient
// ============================================================================

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
}

#[derive(Debug, Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Value>,
}

/// Generic prediction endpoint. A prediction without a string `content`
/// yields [`NO_RESPONSE`].
pub struct VertexPredictClient {
    transport: VertexTransport,
}

impl VertexPredictClient {
    pub fn new(config: VertexConfig, tokens: Arc<AccessTokenProvider>) -> Result<Self, GenerationError> {
        Ok(Self {
            transport: VertexTransport::new(config, tokens)?,
        })
    }
}

#[async_trait]
impl GenerativeBackend for VertexPredictClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = PredictRequest {
            instances: vec![PredictInstance { prompt }],
        };
        let response: PredictResponse = self.transport.call("predict", &request).await?;

        let first = response
            .predictions
            .first()
            .ok_or_else(|| GenerationError::MalformedResponse("no predictions returned".to_string()))?;

        Ok(first
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or(NO_RESPONSE)
            .to_string())
    }

    fn name(&self) -> &str {
        "vertex-predict"
    }
}

// ============================================================================
// VertexGenerateClient
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Direct text generation; the verdict is the first candidate's text parts joined.
pub struct VertexGenerateClient {
    transport: VertexTransport,
}

impl VertexGenerateClient {
    pub fn new(config: VertexConfig, tokens: Arc<AccessTokenProvider>) -> Result<Self, GenerationError> {
        Ok(Self {
            transport: VertexTransport::new(config, tokens)?,
        })
    }
}

#[async_trait]
impl GenerativeBackend for VertexGenerateClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response: GenerateResponse = self.transport.call("generateContent", &request).await?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(GenerationError::MalformedResponse(reason));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::MalformedResponse(format!(
                "candidate has no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "vertex-generate"
    }
}

// ============================================================================
// TESTS
// ============================================================================
