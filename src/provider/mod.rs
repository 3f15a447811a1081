//! # Upstream Secret Providers
//!
//! Capability seam for the source of truth. The synchronizer only sees
//! the [`SecretSource`] trait, so tests can drive it with fakes and the
//! Google implementation stays behind `gcp`.

pub mod gcp;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Upstream label that opts a secret into mirroring
pub const SYNC_LABEL: &str = "sync";
/// Upstream label marking the payload as a single-line env-var file
pub const ENV_LABEL: &str = "env";
/// Upstream label marking the payload as a multi-line env-var file
pub const MULTILINE_LABEL: &str = "multiline";

/// Metadata of an upstream secret, as returned by the provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SecretMetadata {
    /// Whether the secret is labeled for mirroring into the cluster
    pub fn sync_enabled(&self) -> bool {
        self.label_enabled(SYNC_LABEL)
    }

    /// Whether the payload should be parsed as a single-line env-var file
    pub fn env_format(&self) -> bool {
        self.label_enabled(ENV_LABEL)
    }

    /// Whether the payload should be parsed as a multi-line env-var file
    pub fn multiline_format(&self) -> bool {
        self.label_enabled(MULTILINE_LABEL)
    }

    fn label_enabled(&self, key: &str) -> bool {
        self.labels
            .get(key)
            .is_some_and(|value| parse_bool(value))
    }
}

/// Boolean label values: case-insensitive `true`, `t` or `1`;
/// anything else is false
fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "t" | "1")
}

/// Failure modes of an upstream fetch
///
/// `NotFound` is a first-class outcome - the secret was deleted at the
/// source and the mirror must follow. All other variants are transient
/// and leave the message unacknowledged for redelivery.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("secret not found upstream")]
    NotFound,
    #[error("secret manager request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("secret manager api error: {message} (code {code})")]
    Api { code: u16, message: String },
    #[error("secret payload could not be decoded: {0}")]
    Decode(String),
}

/// Read access to the upstream secret store
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch labels and name for a secret
    async fn get_metadata(
        &self,
        project_id: &str,
        secret_name: &str,
    ) -> Result<SecretMetadata, SourceError>;

    /// Fetch the raw bytes of the latest secret version
    async fn get_data(&self, project_id: &str, secret_name: &str)
        -> Result<Vec<u8>, SourceError>;
}
