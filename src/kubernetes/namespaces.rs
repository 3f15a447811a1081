//! # Project Namespaces
//!
//! Resolves a Google project id to the cluster namespace that mirrors
//! it, using the `cnrm.cloud.google.com/project-id` namespace
//! annotation.
//!
//! The mapping is cached for the lifetime of the controller; a miss
//! triggers a full namespace re-list before the miss is reported.
//! Namespace/project assignments are expected to be stable, so the
//! cache is never evicted.

use std::collections::HashMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, info};

/// Namespace annotation mapping it to a Google project id
pub const PROJECT_ID_ANNOTATION: &str = "cnrm.cloud.google.com/project-id";

/// Read access to the cluster's namespaces
#[async_trait]
pub trait NamespaceLister: Send + Sync {
    async fn list_namespaces(&self) -> kube::Result<Vec<Namespace>>;
}

/// Kubernetes API backed lister
#[derive(Clone)]
pub struct KubeNamespaceLister {
    client: Client,
}

impl KubeNamespaceLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceLister for KubeNamespaceLister {
    async fn list_namespaces(&self) -> kube::Result<Vec<Namespace>> {
        let namespaces = Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        Ok(namespaces.items)
    }
}

/// Cached project id to namespace mapping
pub struct ProjectNamespaces {
    lister: Box<dyn NamespaceLister>,
    cache: HashMap<String, String>,
}

impl ProjectNamespaces {
    pub fn new(lister: Box<dyn NamespaceLister>) -> Self {
        Self {
            lister,
            cache: HashMap::new(),
        }
    }

    /// Resolve a project id to its namespace. Returns `Ok(None)` only
    /// when a fresh namespace list still carries no matching
    /// annotation; list errors propagate without touching the cache.
    pub async fn resolve(&mut self, project_id: &str) -> kube::Result<Option<String>> {
        if let Some(namespace) = self.cache.get(project_id) {
            return Ok(Some(namespace.clone()));
        }

        info!(project_id, "cache miss for project id, refreshing namespace cache");
        let namespaces = self.lister.list_namespaces().await?;

        for namespace in namespaces {
            let Some(name) = namespace.metadata.name else {
                continue;
            };
            let annotated_project = namespace
                .metadata
                .annotations
                .and_then(|annotations| annotations.get(PROJECT_ID_ANNOTATION).cloned());
            if let Some(annotated_project) = annotated_project {
                debug!(project_id = %annotated_project, namespace = %name, "caching namespace mapping");
                self.cache.insert(annotated_project, name);
            }
        }

        Ok(self.cache.get(project_id).cloned())
    }
}
