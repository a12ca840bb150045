//! OAuth access tokens for the Google APIs.
//!
//! On Cloud Run the service account token comes from the metadata server and is
//! cached until shortly before it expires. Local runs can supply a static token
//! (e.g. from `gcloud auth print-access-token`).

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Refresh this long before the metadata server says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// A token held by [`AccessTokenProvider::Metadata`] until `refresh_at`.
#[derive(Debug, Clone)]
pub struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub enum AccessTokenProvider {
    Static(String),
    Metadata {
        client: Client,
        base_url: String,
        cached: RwLock<Option<CachedToken>>,
    },
}

impl AccessTokenProvider {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match config.access_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Self::Static(token.to_string())),
            _ => Self::metadata(
                config
                    .metadata_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            ),
        }
    }

    pub fn metadata(base_url: String) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self::Metadata {
            client,
            base_url,
            cached: RwLock::new(None),
        })
    }

    /// Current bearer token.
    pub async fn token(&self) -> Result<String, AuthError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata {
                client,
                base_url,
                cached,
            } => {
                if let Some(token) = cached.read().await.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(token.value.clone());
                    }
                }

                let mut slot = cached.write().await;
                // Another request may have refreshed while we waited for the lock.
                if let Some(token) = slot.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(token.value.clone());
                    }
                }

                let fresh = fetch_metadata_token(client, base_url).await?;
                let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
                *slot = Some(CachedToken {
                    value: fresh.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                tracing::debug!(expires_in = fresh.expires_in, "Refreshed metadata access token");
                Ok(fresh.access_token)
            }
        }
    }
}

async fn fetch_metadata_token(client: &Client, base_url: &str) -> Result<MetadataToken, AuthError> {
    let url = format!("{}/instance/service-accounts/default/token", base_url);
    let response = client
        .get(&url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::error!(code = status.as_u16(), message = %message, "Metadata token request failed");
        return Err(AuthError::Metadata {
            code: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}
