//! OAuth2 access tokens from the GCE metadata server (Workload
//! Identity). The token is fetched once at startup; Google rotates the
//! underlying service-account binding server-side.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)] // Field is required for deserialization but not used after parsing
    expires_in: u64,
}

/// Fetch a bearer token for the pod's default service account
pub(crate) async fn fetch_access_token(client: &reqwest::Client) -> Result<String> {
    let response = client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .context("requesting access token from metadata server")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("metadata server returned {status}: {body}");
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("parsing token response from metadata server")?;

    info!("retrieved access token from metadata server");
    Ok(token.access_token)
}
