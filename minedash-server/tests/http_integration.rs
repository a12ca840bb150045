//! HTTP integration tests for the sensor analysis endpoint.
//!
//! The model and the warehouse are replaced by in-process stubs, so these run
//! without any cloud access. Requests go through the real router via `oneshot`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use minedash_core::envelope::{encode_direct_envelope, encode_push_envelope};
use minedash_core::prompt::{ALERT_TEMPLATE, SAFE_TEMPLATE};
use minedash_core::warehouse::ErrorProto;
use minedash_core::{
    AnalysisRow, GenerationError, GenerativeBackend, RowInsertError, Warehouse, WarehouseError,
};
use minedash_server::http::{analyze_inner, build_router, AnalysisContext, AnalysisSettings};
use serde_json::{json, Value};
use tower::ServiceExt;

// ===========================================================================
// Stubs
// ===========================================================================

/// A model that follows the suggested templates. It reads the reading back out
/// of the `Data: ...` line of the prompt, so it also proves the raw data made it
/// into the prompt.
struct TemplatedModel {
    threshold: f64,
}

#[async_trait]
impl GenerativeBackend for TemplatedModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let data = prompt
            .split("Data: ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .ok_or_else(|| GenerationError::MalformedResponse("no data in prompt".to_string()))?;
        let reading: Value = serde_json::from_str(data)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let value = match &reading["value"] {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        };
        let template = if value > self.threshold {
            ALERT_TEMPLATE
        } else {
            SAFE_TEMPLATE
        };
        Ok(template
            .replace("{value}", &value.to_string())
            .replace("{sensor_id}", reading["sensor_id"].as_str().unwrap_or("")))
    }

    fn name(&self) -> &str {
        "templated-stub"
    }
}

struct FailingModel;

#[async_trait]
impl GenerativeBackend for FailingModel {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Api {
            code: 503,
            message: "The service is currently unavailable.".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing-stub"
    }
}

enum InsertOutcome {
    Accept,
    RejectRow,
    Fail,
}

struct RecordingWarehouse {
    rows: Mutex<Vec<AnalysisRow>>,
    outcome: InsertOutcome,
}

impl RecordingWarehouse {
    fn new(outcome: InsertOutcome) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            outcome,
        })
    }

    fn rows(&self) -> Vec<AnalysisRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn insert_row(&self, row: &AnalysisRow) -> Result<Vec<RowInsertError>, WarehouseError> {
        self.rows.lock().unwrap().push(row.clone());
        match self.outcome {
            InsertOutcome::Accept => Ok(Vec::new()),
            InsertOutcome::RejectRow => Ok(vec![RowInsertError {
                index: 0,
                errors: vec![ErrorProto {
                    reason: "invalid".to_string(),
                    location: "timestamp".to_string(),
                    message: "Invalid timestamp".to_string(),
                }],
            }]),
            InsertOutcome::Fail => Err(WarehouseError::Api {
                code: 403,
                message: "Access Denied".to_string(),
            }),
        }
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn settings() -> AnalysisSettings {
    AnalysisSettings {
        threshold_celsius: 50.0,
        stamp_missing_timestamp: false,
        table_id: "p1.minedash_data.sensor_analysis".to_string(),
    }
}

fn context(
    generator: Arc<dyn GenerativeBackend>,
    warehouse: Arc<RecordingWarehouse>,
) -> Arc<AnalysisContext> {
    Arc::new(AnalysisContext {
        generator,
        warehouse,
        settings: settings(),
    })
}

fn templated() -> Arc<dyn GenerativeBackend> {
    Arc::new(TemplatedModel { threshold: 50.0 })
}

async fn post(ctx: Arc<AnalysisContext>, body: impl Into<Body>) -> (StatusCode, String, String) {
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();

    let resp = build_router(ctx).oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

fn envelope_body(envelope: Value) -> String {
    serde_json::to_string(&envelope).unwrap()
}

// ===========================================================================
// TEST 1: pushed reading above threshold → 200 alert, row persisted
// ===========================================================================
#[tokio::test]
async fn test_pushed_hot_reading_alerts_and_persists() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());
    let data = r#"{"sensor_id":"S1","type":"temp","value":65,"timestamp":"2024-01-01T00:00:00Z"}"#;

    let (status, body, content_type) = post(ctx, envelope_body(encode_push_envelope(data))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/plain"), "got {}", content_type);
    assert!(body.starts_with("Alert"), "Expected alert verdict, got: {}", body);
    assert!(body.contains("65"));
    assert!(body.contains("S1"));

    let rows = warehouse.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        AnalysisRow {
            sensor_id: "S1".to_string(),
            sensor_type: "temp".to_string(),
            value: 65.0,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            analysis_result: body.clone(),
        }
    );
}

// ===========================================================================
// TEST 2: direct reading within range → 200 safe, empty timestamp
// ===========================================================================
#[tokio::test]
async fn test_direct_safe_reading() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());
    let data = r#"{"sensor_id":"S2","type":"temp","value":40}"#;

    let (status, body, _) = post(ctx, envelope_body(encode_direct_envelope(data))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("safe range"), "Expected safe verdict, got: {}", body);
    assert!(body.contains("40"));
    assert!(body.contains("S2"));

    let rows = warehouse.rows();
    assert_eq!(rows[0].value, 40.0);
    assert_eq!(rows[0].timestamp, "");
}

// ===========================================================================
// TEST 3: the threshold itself is still safe
// ===========================================================================
#[tokio::test]
async fn test_value_at_threshold_is_safe() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse);
    let data = r#"{"sensor_id":"S3","value":50}"#;

    let (status, body, _) = post(ctx, envelope_body(encode_push_envelope(data))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("safe range"), "got: {}", body);
}

// ===========================================================================
// TEST 4: push and direct forms of the same payload behave identically
// ===========================================================================
#[tokio::test]
async fn test_push_and_direct_forms_agree() {
    let data = r#"{"sensor_id":"S7","type":"temp","value":"71.5"}"#;

    let pushed_wh = RecordingWarehouse::new(InsertOutcome::Accept);
    let (_, pushed, _) = post(
        context(templated(), pushed_wh.clone()),
        envelope_body(encode_push_envelope(data)),
    )
    .await;

    let direct_wh = RecordingWarehouse::new(InsertOutcome::Accept);
    let (_, direct, _) = post(
        context(templated(), direct_wh.clone()),
        envelope_body(encode_direct_envelope(data)),
    )
    .await;

    assert_eq!(pushed, direct);
    assert_eq!(pushed_wh.rows(), direct_wh.rows());
    assert_eq!(pushed_wh.rows()[0].value, 71.5);
}

// ===========================================================================
// TEST 5: missing optional fields default to empty strings
// ===========================================================================
#[tokio::test]
async fn test_missing_fields_default() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());

    let (status, _, _) = post(ctx, envelope_body(encode_push_envelope(r#"{"value":12}"#))).await;

    assert_eq!(status, StatusCode::OK);
    let row = &warehouse.rows()[0];
    assert_eq!(row.sensor_id, "");
    assert_eq!(row.sensor_type, "");
    assert_eq!(row.timestamp, "");
    assert_eq!(row.value, 12.0);
}

// ===========================================================================
// TEST 6: an empty direct envelope analyses `{}`
// ===========================================================================
#[tokio::test]
async fn test_empty_direct_envelope() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());

    let (status, _, _) = post(ctx, "{}").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(warehouse.rows()[0].value, 0.0);
}

// ===========================================================================
// TEST 7: non-numeric value → 500 and nothing appended
// ===========================================================================
#[tokio::test]
async fn test_non_numeric_value_is_500_without_append() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());
    let data = r#"{"sensor_id":"S4","value":"scorching"}"#;

    let (status, body, _) = post(ctx, envelope_body(encode_push_envelope(data))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error: could not convert value to float: 'scorching'");
    assert!(warehouse.rows().is_empty(), "No row may be appended");
}

// ===========================================================================
// TEST 8: per-row warehouse errors are invisible to the caller
// ===========================================================================
#[tokio::test]
async fn test_row_errors_still_return_verdict() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::RejectRow);
    let ctx = context(templated(), warehouse.clone());
    let data = r#"{"sensor_id":"S1","value":65,"timestamp":"yesterday"}"#;

    let (status, body, _) = post(ctx, envelope_body(encode_push_envelope(data))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Alert"));
    assert_eq!(warehouse.rows().len(), 1);
}

// ===========================================================================
// TEST 9: the append call itself failing is a 500
// ===========================================================================
#[tokio::test]
async fn test_append_call_failure_is_500() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Fail);
    let ctx = context(templated(), warehouse);

    let (status, body, _) = post(
        ctx,
        envelope_body(encode_push_envelope(r#"{"sensor_id":"S1","value":65}"#)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error: BigQuery API error (403): Access Denied");
}

// ===========================================================================
// TEST 10: model failure → 500, nothing appended
// ===========================================================================
#[tokio::test]
async fn test_model_failure_is_500() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(Arc::new(FailingModel), warehouse.clone());

    let (status, body, _) = post(
        ctx,
        envelope_body(encode_push_envelope(r#"{"sensor_id":"S1","value":65}"#)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        "Error: Model API error (503): The service is currently unavailable."
    );
    assert!(warehouse.rows().is_empty());
}

// ===========================================================================
// TEST 11: malformed inputs all collapse to 500 "Error: ..."
// ===========================================================================
#[tokio::test]
async fn test_malformed_inputs_are_500() {
    let cases = [
        "not json".to_string(),
        "[]".to_string(),
        envelope_body(json!({ "message": { "data": "%%%not-base64%%%" } })),
        envelope_body(json!({ "message": { "messageId": "1" } })),
        envelope_body(encode_push_envelope("{not valid json")),
        envelope_body(encode_direct_envelope("42")),
    ];

    for case in cases {
        let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
        let ctx = context(templated(), warehouse.clone());
        let (status, body, _) = post(ctx, case.clone()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "case: {}", case);
        assert!(body.starts_with("Error: "), "case: {} body: {}", case, body);
        assert!(warehouse.rows().is_empty());
    }
}

// ===========================================================================
// TEST 12: missing content type is not special-cased
// ===========================================================================
#[tokio::test]
async fn test_body_without_content_type_is_still_decoded() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(envelope_body(encode_push_envelope(
            r#"{"sensor_id":"S2","value":40}"#,
        ))))
        .unwrap();
    let resp = build_router(ctx).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(warehouse.rows().len(), 1);
}

// ===========================================================================
// TEST 13: only POST / is routed
// ===========================================================================
#[tokio::test]
async fn test_other_routes_are_not_served() {
    let ctx = context(templated(), RecordingWarehouse::new(InsertOutcome::Accept));

    let get = Request::builder().method("GET").uri("/").body(Body::empty()).unwrap();
    let resp = build_router(ctx.clone()).oneshot(get).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let other = Request::builder()
        .method("POST")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(ctx).oneshot(other).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 14: analyze_inner can be driven without axum
// ===========================================================================
#[tokio::test]
async fn test_analyze_inner_directly() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());
    let body = envelope_body(encode_direct_envelope(r#"{"sensor_id":"S8","value":90.25}"#));

    let verdict = analyze_inner(&ctx, body.as_bytes()).await.unwrap();

    assert_eq!(
        verdict,
        "Alert: High temperature (90.25°C), failure risk on sensor S8."
    );
    assert_eq!(warehouse.rows()[0].analysis_result, verdict);
}

// ===========================================================================
// TEST 15: stamping missing timestamps when configured
// ===========================================================================
#[tokio::test]
async fn test_missing_timestamp_is_stamped_when_enabled() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = Arc::new(AnalysisContext {
        generator: templated(),
        warehouse: warehouse.clone(),
        settings: AnalysisSettings {
            stamp_missing_timestamp: true,
            ..settings()
        },
    });

    let body = envelope_body(encode_push_envelope(r#"{"sensor_id":"S2","value":40}"#));
    analyze_inner(&ctx, body.as_bytes()).await.unwrap();

    let row = &warehouse.rows()[0];
    assert!(!row.timestamp.is_empty());
    assert!(row.timestamp.ends_with('Z'), "got {}", row.timestamp);
}

// ===========================================================================
// TEST 16: multi-megabyte pushes are accepted
// ===========================================================================
#[tokio::test]
async fn test_large_push_is_accepted() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());
    let data = format!(
        r#"{{"sensor_id":"S5","value":40,"notes":"{}"}}"#,
        "x".repeat(3 * 1024 * 1024)
    );
    let body = envelope_body(encode_push_envelope(&data));
    assert!(body.len() > 2 * 1024 * 1024);

    let (status, body, _) = post(ctx, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Temperature within safe range (40°C) for sensor S5.");
    assert_eq!(warehouse.rows().len(), 1);
}

// ===========================================================================
// TEST 17: non-finite value → 500 and nothing appended
// ===========================================================================
#[tokio::test]
async fn test_non_finite_value_is_500_without_append() {
    let warehouse = RecordingWarehouse::new(InsertOutcome::Accept);
    let ctx = context(templated(), warehouse.clone());

    let (status, body, _) = post(
        ctx,
        envelope_body(encode_direct_envelope(r#"{"sensor_id":"S6","value":"nan"}"#)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error: could not convert value to float: 'nan'");
    assert!(warehouse.rows().is_empty(), "No row may be appended");
}
