//! # Secret Manager REST Client
//!
//! [`SecretSource`] implementation over the Secret Manager REST API v1.
//!
//! Metadata reads address the secret resource itself; data reads always
//! access `versions/latest`, so every reconciliation mirrors the
//! current upstream state regardless of which version the event named.
//!
//! Reference: <https://cloud.google.com/secret-manager/docs/reference/rest>

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::auth;
use crate::observability::metrics;
use crate::provider::{SecretMetadata, SecretSource, SourceError};

const DEFAULT_BASE_URL: &str = "https://secretmanager.googleapis.com";

/// Secret payload carried by a version access response; the `data`
/// field is base64-encoded on the wire
#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct GcpErrorResponse {
    error: GcpError,
}

#[derive(Debug, Deserialize)]
struct GcpError {
    code: u16,
    message: String,
}

/// Secret Manager REST client
pub struct SecretManagerSource {
    http_client: Client,
    base_url: String,
    access_token: String,
}

impl SecretManagerSource {
    /// Create a client authenticated via the metadata server
    pub async fn new() -> Result<Self> {
        let http_client = Client::builder()
            .build()
            .context("creating secret manager http client")?;
        let access_token = auth::fetch_access_token(&http_client).await?;

        Ok(Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, SourceError> {
        let url = format!("{}/v1/{}", self.base_url, path);
        let start = Instant::now();
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await;
        metrics::observe_secret_manager_response_time(start.elapsed().as_secs_f64());

        let response = response?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<GcpErrorResponse>(&body) {
                Ok(parsed) => SourceError::Api {
                    code: parsed.error.code,
                    message: parsed.error.message,
                },
                Err(_) => SourceError::Api {
                    code: status.as_u16(),
                    message: body,
                },
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SecretSource for SecretManagerSource {
    async fn get_metadata(
        &self,
        project_id: &str,
        secret_name: &str,
    ) -> Result<SecretMetadata, SourceError> {
        debug!(project_id, secret_name, "fetching secret metadata");
        self.get_json(&format!("projects/{project_id}/secrets/{secret_name}"))
            .await
    }

    async fn get_data(
        &self,
        project_id: &str,
        secret_name: &str,
    ) -> Result<Vec<u8>, SourceError> {
        debug!(project_id, secret_name, "fetching secret data");
        let response: AccessSecretVersionResponse = self
            .get_json(&format!(
                "projects/{project_id}/secrets/{secret_name}/versions/latest:access"
            ))
            .await?;

        general_purpose::STANDARD
            .decode(response.payload.data.as_bytes())
            .map_err(|err| SourceError::Decode(err.to_string()))
    }
}
