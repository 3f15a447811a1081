//! # Cluster Secrets
//!
//! Assembly of the mirrored `Secret` object and the store seam used by
//! the synchronizer.
//!
//! Every object this controller creates carries the ownership label
//! `nais.io/created-by=hunter2`. The controller must never create,
//! update or delete a secret without that label.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::Client;

/// Ownership marker label
pub const CREATED_BY_LABEL: &str = "nais.io/created-by";
/// Ownership marker value
pub const CREATED_BY_VALUE: &str = "hunter2";

/// RFC3339 time of the change event that produced the object
pub const LAST_MODIFIED_ANNOTATION: &str = "hunter2.nais.io/last-modified";
/// Principal that performed the upstream change
pub const LAST_MODIFIED_BY_ANNOTATION: &str = "hunter2.nais.io/last-modified-by";
/// Upstream secret version named by the change event
pub const SECRET_VERSION_ANNOTATION: &str = "hunter2.nais.io/secret-version";
/// Opt-in marker for the Stakater reloader, so consumers restart on change
pub const RELOADER_ANNOTATION: &str = "reloader.stakater.com/match";

/// Everything needed to assemble a mirrored cluster secret
#[derive(Debug, Clone)]
pub struct SecretData {
    pub name: String,
    pub namespace: String,
    pub payload: Vec<(String, String)>,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by: String,
    pub secret_version: String,
}

/// Build the opaque cluster secret for the given data. The name is
/// lowercased to stay cluster-legal for mixed-case upstream names.
pub fn opaque_secret(data: SecretData) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(data.name.to_lowercase()),
            namespace: Some(data.namespace),
            labels: Some(BTreeMap::from([(
                CREATED_BY_LABEL.to_string(),
                CREATED_BY_VALUE.to_string(),
            )])),
            annotations: Some(BTreeMap::from([
                (
                    LAST_MODIFIED_ANNOTATION.to_string(),
                    data.last_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    LAST_MODIFIED_BY_ANNOTATION.to_string(),
                    data.last_modified_by,
                ),
                (SECRET_VERSION_ANNOTATION.to_string(), data.secret_version),
                (RELOADER_ANNOTATION.to_string(), "true".to_string()),
            ])),
            ..ObjectMeta::default()
        },
        string_data: Some(data.payload.into_iter().collect()),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    }
}

/// Whether the secret carries the ownership marker
pub fn is_owned(secret: &Secret) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.get(CREATED_BY_LABEL).map(String::as_str) == Some(CREATED_BY_VALUE))
}

/// Write access to the cluster's secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Secret>;
    async fn create(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret>;
    async fn update(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret>;
    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()>;

    /// List secrets carrying the ownership marker across all namespaces
    async fn list_owned(&self) -> kube::Result<Vec<Secret>>;
}

/// Kubernetes API backed store
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Secret> {
        self.api(namespace).get(name).await
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret> {
        self.api(namespace)
            .create(&PostParams::default(), secret)
            .await
    }

    async fn update(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        self.api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }

    async fn list_owned(&self) -> kube::Result<Vec<Secret>> {
        let selector = format!("{CREATED_BY_LABEL}={CREATED_BY_VALUE}");
        let secrets = Api::<Secret>::all(self.client.clone())
            .list(&ListParams::default().labels(&selector))
            .await?;
        Ok(secrets.items)
    }
}
