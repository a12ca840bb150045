//! MineDash HTTP surface
//!
//! A single `POST /` endpoint receives Pub/Sub push deliveries. The axum handler
//! is a thin wrapper around [`analyze_inner`], which runs the whole pipeline:
//!
//! envelope decode → reading parse → prompt → model call → row → warehouse append
//!
//! Success returns the model's verdict as `text/plain` with 200. Any failure
//! returns `Error: <message>` with 500.
//! Per-row warehouse errors are logged and do not fail the request.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use minedash_core::config::HttpConfig;
use minedash_core::models::{AnalysisRow, SensorReading};
use minedash_core::prompt::build_prompt;
use minedash_core::{decode_envelope, GenerativeBackend, MinedashConfig, Warehouse};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::AnalysisError;

/// Per-process analysis settings derived from config.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub threshold_celsius: f64,
    pub stamp_missing_timestamp: bool,
    pub table_id: String,
}

impl AnalysisSettings {
    pub fn from_config(config: &MinedashConfig) -> Self {
        Self {
            threshold_celsius: config.analysis.threshold_celsius,
            stamp_missing_timestamp: config.analysis.stamp_missing_timestamp,
            table_id: config.table_id(),
        }
    }
}

/// Clients created once at startup and shared by every request.
#[derive(Clone)]
pub struct AnalysisContext {
    pub generator: Arc<dyn GenerativeBackend>,
    pub warehouse: Arc<dyn Warehouse>,
    pub settings: AnalysisSettings,
}

/// Largest accepted push body: a 10 MB Pub/Sub message once base64-encoded,
/// plus room for the envelope's attributes.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the Axum router.
pub fn build_router(ctx: Arc<AnalysisContext>) -> Router {
    Router::new()
        .route("/", post(analyze_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ctx)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: &HttpConfig,
    ctx: Arc<AnalysisContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(ctx);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("MineDash sensor analysis listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Run one push delivery through the pipeline and return the verdict.
pub async fn analyze_inner(ctx: &AnalysisContext, body: &[u8]) -> Result<String, AnalysisError> {
    let payload = decode_envelope(body)?;
    let reading = SensorReading::parse(&payload.data)?;
    tracing::info!(
        sensor_id = %reading.sensor_id,
        sensor_type = %reading.sensor_type,
        form = ?payload.form,
        message_id = payload.message_id.as_deref().unwrap_or(""),
        subscription = payload.subscription.as_deref().unwrap_or(""),
        "Sensor reading received"
    );

    let prompt = build_prompt(&payload.data, ctx.settings.threshold_celsius);
    let verdict = ctx.generator.generate(&prompt).await?;
    tracing::info!(backend = ctx.generator.name(), verdict = %verdict, "Model verdict");

    let row = AnalysisRow::build(&reading, verdict.as_str(), ctx.settings.stamp_missing_timestamp)?;

    let row_errors = ctx.warehouse.insert_row(&row).await?;
    if row_errors.is_empty() {
        tracing::info!(table = %ctx.settings.table_id, row = ?row, "Row inserted");
    } else {
        tracing::error!(
            table = %ctx.settings.table_id,
            errors = ?row_errors,
            "Warehouse rejected row"
        );
    }

    Ok(verdict)
}

pub async fn analyze_handler(State(ctx): State<Arc<AnalysisContext>>, body: Bytes) -> Response {
    match analyze_inner(&ctx, &body).await {
        Ok(verdict) => (StatusCode::OK, verdict).into_response(),
        Err(e) => {
            tracing::error!(stage = e.stage(), error = %e, "Error processing sensor data");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}
