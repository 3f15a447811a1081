//! Shared fakes for driving the synchronizer without any network I/O.
//!
//! Each fake implements one of the capability seams: upstream secret
//! source, downstream secret store, namespace lister and the message
//! acknowledgement token.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;

use hunter2::kubernetes::namespaces::{NamespaceLister, ProjectNamespaces, PROJECT_ID_ANNOTATION};
use hunter2::kubernetes::secrets::SecretStore;
use hunter2::provider::gcp::{Acknowledge, IncomingMessage};
use hunter2::provider::{SecretMetadata, SecretSource, SourceError};
use hunter2::synchronizer::Synchronizer;

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} error"),
        reason: reason.to_string(),
        code,
    })
}

// ---------------------------------------------------------------------------
// Messages

struct RecordingAckToken(Arc<AtomicBool>);

#[async_trait]
impl Acknowledge for RecordingAckToken {
    async fn ack(self: Box<Self>) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Build a message whose acknowledgement is observable through the
/// returned flag
pub fn message(data: &[u8]) -> (IncomingMessage, Arc<AtomicBool>) {
    let acked = Arc::new(AtomicBool::new(false));
    let msg = IncomingMessage::new(data.to_vec(), Box::new(RecordingAckToken(acked.clone())));
    (msg, acked)
}

/// A well-formed audit record for the given project and resource name
pub fn audit_record(project_id: &str, resource_name: &str) -> Vec<u8> {
    serde_json::json!({
        "timestamp": "2021-03-17T09:00:00Z",
        "protoPayload": {
            "resourceName": resource_name,
            "authenticationInfo": {
                "principalEmail": "someone@domain.test"
            }
        },
        "resource": {
            "labels": {
                "project_id": project_id
            }
        }
    })
    .to_string()
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Upstream source

/// Upstream outcome for one operation of the fake source
pub enum Upstream<T> {
    Ok(T),
    NotFound,
    Transient,
}

pub struct FakeSource {
    pub metadata: Upstream<SecretMetadata>,
    pub data: Upstream<Vec<u8>>,
}

#[async_trait]
impl SecretSource for FakeSource {
    async fn get_metadata(
        &self,
        _project_id: &str,
        _secret_name: &str,
    ) -> Result<SecretMetadata, SourceError> {
        match &self.metadata {
            Upstream::Ok(metadata) => Ok(metadata.clone()),
            Upstream::NotFound => Err(SourceError::NotFound),
            Upstream::Transient => Err(SourceError::Api {
                code: 500,
                message: "upstream unavailable".to_string(),
            }),
        }
    }

    async fn get_data(
        &self,
        _project_id: &str,
        _secret_name: &str,
    ) -> Result<Vec<u8>, SourceError> {
        match &self.data {
            Upstream::Ok(data) => Ok(data.clone()),
            Upstream::NotFound => Err(SourceError::NotFound),
            Upstream::Transient => Err(SourceError::Api {
                code: 500,
                message: "upstream unavailable".to_string(),
            }),
        }
    }
}

pub fn metadata_with_labels(pairs: &[(&str, &str)]) -> SecretMetadata {
    SecretMetadata {
        name: "projects/123/secrets/test".to_string(),
        labels: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

// ---------------------------------------------------------------------------
// Downstream store

/// Operation the fake store should fail with a 500
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    Get,
    Create,
    Update,
    Delete,
    List,
}

/// In-memory cluster secret store keyed by (namespace, name)
#[derive(Clone)]
pub struct FakeStore {
    state: Arc<Mutex<BTreeMap<(String, String), Secret>>>,
    fail_on: Arc<Mutex<FailOn>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BTreeMap::new())),
            fail_on: Arc::new(Mutex::new(FailOn::Nothing)),
        }
    }

    pub fn fail_on(&self, mode: FailOn) {
        *self.fail_on.lock().unwrap() = mode;
    }

    pub fn insert(&self, namespace: &str, secret: Secret) {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name), secret);
    }

    pub fn get_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn failing(&self, op: FailOn) -> bool {
        *self.fail_on.lock().unwrap() == op
    }
}

#[async_trait]
impl SecretStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Secret> {
        if self.failing(FailOn::Get) {
            return Err(api_error(500, "InternalError"));
        }
        self.get_secret(namespace, name)
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret> {
        if self.failing(FailOn::Create) {
            return Err(api_error(500, "InternalError"));
        }
        let name = secret.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name);
        let mut state = self.state.lock().unwrap();
        if state.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn update(&self, namespace: &str, secret: &Secret) -> kube::Result<Secret> {
        if self.failing(FailOn::Update) {
            return Err(api_error(500, "InternalError"));
        }
        let name = secret.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name);
        let mut state = self.state.lock().unwrap();
        if !state.contains_key(&key) {
            return Err(api_error(404, "NotFound"));
        }
        state.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()> {
        if self.failing(FailOn::Delete) {
            return Err(api_error(500, "InternalError"));
        }
        let key = (namespace.to_string(), name.to_string());
        let mut state = self.state.lock().unwrap();
        if state.remove(&key).is_none() {
            return Err(api_error(404, "NotFound"));
        }
        Ok(())
    }

    async fn list_owned(&self) -> kube::Result<Vec<Secret>> {
        if self.failing(FailOn::List) {
            return Err(api_error(500, "InternalError"));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .values()
            .filter(|secret| hunter2::kubernetes::secrets::is_owned(secret))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Namespaces

pub struct FakeNamespaces(pub Vec<Namespace>);

#[async_trait]
impl NamespaceLister for FakeNamespaces {
    async fn list_namespaces(&self) -> kube::Result<Vec<Namespace>> {
        Ok(self.0.clone())
    }
}

pub fn annotated_namespace(name: &str, project_id: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                PROJECT_ID_ANNOTATION.to_string(),
                project_id.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

// ---------------------------------------------------------------------------
// Assembly

/// Wire a synchronizer from fakes; the returned store handle shares
/// state with the synchronizer's copy
pub fn build_synchronizer(source: FakeSource, namespaces: Vec<Namespace>) -> (Synchronizer, FakeStore) {
    let store = FakeStore::new();
    let synchronizer = Synchronizer::new(
        Box::new(source),
        Box::new(store.clone()),
        ProjectNamespaces::new(Box::new(FakeNamespaces(namespaces))),
    );
    (synchronizer, store)
}
