//! # Kubernetes
//!
//! Cluster client construction and the downstream secret store.

pub mod namespaces;
pub mod secrets;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

/// Create a kube client from an optional kubeconfig path, falling back
/// to the in-cluster/default configuration chain
pub async fn create_client(kubeconfig_path: Option<&str>) -> Result<Client> {
    match kubeconfig_path {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig from {path}"))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?;
            Client::try_from(config).context("creating kubernetes client")
        }
        None => Client::try_default()
            .await
            .context("creating kubernetes client"),
    }
}

/// Whether the error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Whether the error is a 409 AlreadyExists from the API server
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 409)
}
