//! # Audit Envelope
//!
//! Decodes the Pub/Sub payload - a Cloud Audit Logs record in JSON -
//! into a typed [`ChangeEvent`].
//!
//! The record's `protoPayload.resourceName` carries the path
//! `projects/<project>/secrets/<name>[/versions/<version>]`; the owning
//! project is read from the `resource.labels.project_id` label, which is
//! authoritative even when it disagrees with the path token.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::constants::DEFAULT_SECRET_VERSION;

/// A single Secret Manager change announced by the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub secret_name: String,
    pub secret_version: String,
    pub project_id: String,
    pub principal_email: String,
    pub timestamp: DateTime<Utc>,
}

/// Reasons an audit record cannot yield a [`ChangeEvent`]
///
/// Every variant is a poison pill: redelivering the message cannot
/// change the outcome, so the caller acknowledges and drops it.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed audit envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("resource name {0:?} does not identify a secret")]
    NoSecretName(String),
    #[error("audit envelope carries no project id")]
    NoProjectId,
}

#[derive(Debug, Deserialize)]
struct AuditEnvelope {
    timestamp: DateTime<Utc>,
    #[serde(rename = "protoPayload", default)]
    proto_payload: ProtoPayload,
    #[serde(default)]
    resource: Resource,
}

#[derive(Debug, Default, Deserialize)]
struct ProtoPayload {
    #[serde(rename = "resourceName", default)]
    resource_name: String,
    #[serde(rename = "authenticationInfo", default)]
    authentication_info: AuthenticationInfo,
}

#[derive(Debug, Default, Deserialize)]
struct AuthenticationInfo {
    #[serde(rename = "principalEmail", default)]
    principal_email: String,
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    labels: ResourceLabels,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceLabels {
    #[serde(default)]
    project_id: String,
}

/// Decode a raw Pub/Sub payload into a [`ChangeEvent`]
pub fn decode(data: &[u8]) -> Result<ChangeEvent, EnvelopeError> {
    let envelope: AuditEnvelope = serde_json::from_slice(data)?;

    let resource_name = envelope.proto_payload.resource_name;
    let (secret_name, secret_version) = parse_resource_name(&resource_name)
        .ok_or_else(|| EnvelopeError::NoSecretName(resource_name.clone()))?;

    let project_id = envelope.resource.labels.project_id;
    if project_id.is_empty() {
        return Err(EnvelopeError::NoProjectId);
    }

    Ok(ChangeEvent {
        secret_name,
        secret_version,
        project_id,
        principal_email: envelope.proto_payload.authentication_info.principal_email,
        timestamp: envelope.timestamp,
    })
}

/// Split a `projects/<project>/secrets/<name>[/versions/<version>]`
/// path into the secret name and version, defaulting the version when
/// the record names a secret rather than a specific version.
fn parse_resource_name(resource_name: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = resource_name.split('/').collect();
    if tokens.len() < 4 || tokens[0] != "projects" || tokens[2] != "secrets" {
        return None;
    }

    let secret_name = tokens[3];
    if secret_name.is_empty() {
        return None;
    }

    let secret_version = match tokens.get(4) {
        Some(&"versions") => tokens.get(5).copied().filter(|v| !v.is_empty())?,
        _ => DEFAULT_SECRET_VERSION,
    };

    Some((secret_name.to_string(), secret_version.to_string()))
}
