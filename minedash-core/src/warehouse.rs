//! Append-only persistence of analysis rows to BigQuery (`tabledata.insertAll`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AccessTokenProvider;
use crate::config::MinedashConfig;
use crate::error::{google_error_parts, WarehouseError};
use crate::models::AnalysisRow;

/// A per-row failure reported by the warehouse. The call itself succeeded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RowInsertError {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Append one row. `Ok` with a non-empty vector means the row was rejected.
    async fn insert_row(&self, row: &AnalysisRow) -> Result<Vec<RowInsertError>, WarehouseError>;
}

/// Fully-qualified table coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn from_config(config: &MinedashConfig) -> Self {
        Self {
            project_id: config.gcp.project_id.clone(),
            dataset: config.warehouse.dataset.clone(),
            table: config.warehouse.table.clone(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset, self.table)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    rows: Vec<InsertAllRow<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRow<'a> {
    insert_id: String,
    json: &'a AnalysisRow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowInsertError>,
}

pub struct BigQueryClient {
    client: Client,
    base_url: String,
    table: TableRef,
    tokens: Arc<AccessTokenProvider>,
}

impl BigQueryClient {
    pub fn new(
        base_url: String,
        table: TableRef,
        timeout: Duration,
        tokens: Arc<AccessTokenProvider>,
    ) -> Result<Self, WarehouseError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            table,
            tokens,
        })
    }

    pub fn from_config(
        config: &MinedashConfig,
        tokens: Arc<AccessTokenProvider>,
    ) -> Result<Self, WarehouseError> {
        Self::new(
            config.bigquery_base_url(),
            TableRef::from_config(config),
            Duration::from_secs(config.warehouse.timeout_seconds),
            tokens,
        )
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    fn insert_all_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url, self.table.project_id, self.table.dataset, self.table.table
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn insert_row(&self, row: &AnalysisRow) -> Result<Vec<RowInsertError>, WarehouseError> {
        let request = InsertAllRequest {
            rows: vec![InsertAllRow {
                insert_id: Uuid::new_v4().to_string(),
                json: row,
            }],
        };
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(self.insert_all_url())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = google_error_parts(status.as_u16(), error_body);
            tracing::error!(code = code, message = %message, table = %self.table, "BigQuery API error");
            return Err(WarehouseError::Api { code, message });
        }

        let body: InsertAllResponse = response.json().await?;
        Ok(body.insert_errors)
    }
}
