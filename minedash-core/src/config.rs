use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MinedashConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub gcp: GcpConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GcpConfig {
    pub project_id: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    "southamerica-west1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// `vertex-predict` or `vertex-generate`
    pub backend: String,
    pub model_id: String,
    /// Overrides `https://{region}-aiplatform.googleapis.com/v1`
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: "vertex-predict".to_string(),
            model_id: "gemini-1.5-pro".to_string(),
            base_url: None,
            timeout_seconds: 60,
            max_retries: 0,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WarehouseConfig {
    pub dataset: String,
    pub table: String,
    /// Overrides `https://bigquery.googleapis.com/bigquery/v2`
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dataset: "minedash_data".to_string(),
            table: "sensor_analysis".to_string(),
            base_url: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Static bearer token. When unset, tokens come from the metadata server.
    pub access_token: Option<String>,
    pub metadata_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub threshold_celsius: f64,
    pub stamp_missing_timestamp: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_celsius: 50.0,
            stamp_missing_timestamp: false,
        }
    }
}

impl MinedashConfig {
    /// Load from an optional TOML file, then `MINEDASH__SECTION__KEY` env vars,
    /// then a bare `PORT` (set by Cloud Run).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("MINEDASH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let s = with_port_override(s, std::env::var("PORT").ok())?;
        s.build()?.try_deserialize()
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Fully-qualified `project.dataset.table` identifier.
    pub fn table_id(&self) -> String {
        format!(
            "{}.{}.{}",
            self.gcp.project_id, self.warehouse.dataset, self.warehouse.table
        )
    }

    /// Vertex AI publisher model resource name.
    pub fn model_endpoint(&self) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.gcp.project_id, self.gcp.region, self.model.model_id
        )
    }

    pub fn vertex_base_url(&self) -> String {
        self.model.base_url.clone().unwrap_or_else(|| {
            format!("https://{}-aiplatform.googleapis.com/v1", self.gcp.region)
        })
    }

    pub fn bigquery_base_url(&self) -> String {
        self.warehouse
            .base_url
            .clone()
            .unwrap_or_else(|| "https://bigquery.googleapis.com/bigquery/v2".to_string())
    }
}

fn with_port_override(
    builder: ConfigBuilder<DefaultState>,
    port: Option<String>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder.set_override_option("http.port", port.filter(|p| !p.trim().is_empty()))
}
