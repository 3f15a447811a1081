//! # Synchronizer
//!
//! Processes one audit event end to end: decode, resolve the target
//! namespace, enforce ownership, fetch the upstream state and mirror it
//! into the cluster.
//!
//! Acknowledgement discipline: a message is acknowledged exactly when
//! redelivery cannot change the outcome - successful mirroring, an
//! undecodable envelope, a foreign downstream secret, or an upstream
//! that opted out of syncing. Every transient failure returns without
//! acking so the subscription redelivers. A payload that fails to parse
//! also stays unacked: the upstream content is wrong and redelivery
//! picks up the fix.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::envelope::{self, ChangeEvent};
use crate::kubernetes::namespaces::ProjectNamespaces;
use crate::kubernetes::secrets::{self, SecretData, SecretStore};
use crate::kubernetes::{is_already_exists, is_not_found};
use crate::observability::metrics::{log_request, Operation, Status, System};
use crate::payload::{self, PayloadFormatError};
use crate::provider::gcp::IncomingMessage;
use crate::provider::{SecretSource, SourceError};

/// Failure modes of one synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("secret {name} exists in cluster but is not managed by this controller")]
    NotManaged { name: String },
    #[error("no namespace found for project id {0}")]
    UnknownProject(String),
    #[error("wrong secret format: {0}")]
    InvalidFormat(#[from] PayloadFormatError),
    #[error("secret manager operation failed: {0}")]
    Source(#[from] SourceError),
    #[error("kubernetes operation failed: {0}")]
    Kubernetes(#[from] kube::Error),
}

/// Mirrors upstream secret state into the cluster, one event at a time
pub struct Synchronizer {
    source: Box<dyn SecretSource>,
    store: Box<dyn SecretStore>,
    namespaces: ProjectNamespaces,
}

impl Synchronizer {
    pub fn new(
        source: Box<dyn SecretSource>,
        store: Box<dyn SecretStore>,
        namespaces: ProjectNamespaces,
    ) -> Self {
        Self {
            source,
            store,
            namespaces,
        }
    }

    /// Process one subscription message
    pub async fn sync(&mut self, msg: IncomingMessage) -> Result<(), SyncError> {
        let event = match envelope::decode(&msg.data) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping undecodable message");
                log_request(System::PubSub, Operation::Read, Status::InvalidData);
                msg.ack().await;
                return Ok(());
            }
        };

        debug!(
            secret_name = %event.secret_name,
            secret_version = %event.secret_version,
            project_id = %event.project_id,
            principal_email = %event.principal_email,
            "processing change event"
        );

        let namespace = self.resolve_namespace(&event.project_id).await?;
        let secret_name = event.secret_name.to_lowercase();

        // Never touch a downstream secret this controller did not create.
        match self.store.get(&namespace, &secret_name).await {
            Ok(existing) if !secrets::is_owned(&existing) => {
                log_request(System::Kubernetes, Operation::Read, Status::NotManaged);
                msg.ack().await;
                return Err(SyncError::NotManaged { name: secret_name });
            }
            Ok(_) => {}
            Err(err) if is_not_found(&err) => {}
            Err(err) => {
                log_request(System::Kubernetes, Operation::Read, Status::Error);
                return Err(err.into());
            }
        }

        // Metadata gates syncing; a missing upstream secret skips the
        // gate so the deletion below can still happen.
        let metadata = match self.source.get_metadata(&event.project_id, &event.secret_name).await {
            Ok(metadata) => {
                if !metadata.sync_enabled() {
                    log_request(System::SecretManager, Operation::Read, Status::NoSyncLabel);
                    debug!(secret_name = %event.secret_name, "secret is not labeled for sync, skipping");
                    msg.ack().await;
                    return Ok(());
                }
                Some(metadata)
            }
            Err(SourceError::NotFound) => None,
            Err(err) => {
                log_request(System::SecretManager, Operation::Read, Status::Error);
                return Err(err.into());
            }
        };

        match self.source.get_data(&event.project_id, &event.secret_name).await {
            Ok(raw) => {
                let entries = match payload::secret_payload(metadata.as_ref(), &raw) {
                    Ok(entries) => {
                        log_request(System::SecretManager, Operation::Read, Status::Success);
                        entries
                    }
                    Err(err) => {
                        log_request(System::SecretManager, Operation::Read, Status::InvalidData);
                        return Err(err.into());
                    }
                };
                self.create_or_update_secret(&event, &namespace, entries)
                    .await?;
            }
            Err(SourceError::NotFound) => {
                // The upstream secret is gone; the mirror follows.
                self.delete_secret(&namespace, &secret_name).await?;
            }
            Err(err) => {
                log_request(System::SecretManager, Operation::Read, Status::Error);
                return Err(err.into());
            }
        }

        info!(
            secret_name = %event.secret_name,
            secret_version = %event.secret_version,
            project_id = %event.project_id,
            "successfully processed message, acking"
        );
        msg.ack().await;
        Ok(())
    }

    /// Count of cluster secrets carrying the ownership marker
    pub async fn managed_secret_count(&self) -> kube::Result<usize> {
        Ok(self.store.list_owned().await?.len())
    }

    async fn resolve_namespace(&mut self, project_id: &str) -> Result<String, SyncError> {
        match self.namespaces.resolve(project_id).await {
            Ok(Some(namespace)) => Ok(namespace),
            Ok(None) => Err(SyncError::UnknownProject(project_id.to_string())),
            Err(err) => {
                log_request(System::Kubernetes, Operation::Read, Status::Error);
                Err(err.into())
            }
        }
    }

    async fn create_or_update_secret(
        &self,
        event: &ChangeEvent,
        namespace: &str,
        entries: Vec<(String, String)>,
    ) -> Result<(), SyncError> {
        let secret = secrets::opaque_secret(SecretData {
            name: event.secret_name.clone(),
            namespace: namespace.to_string(),
            payload: entries,
            last_modified: event.timestamp,
            last_modified_by: event.principal_email.clone(),
            secret_version: event.secret_version.clone(),
        });

        debug!(secret_name = %event.secret_name, namespace, "creating or updating cluster secret");
        match self.store.create(namespace, &secret).await {
            Ok(_) => {
                log_request(System::Kubernetes, Operation::Create, Status::Success);
                Ok(())
            }
            Err(err) if is_already_exists(&err) => {
                let updated = self.store.update(namespace, &secret).await;
                log_request(
                    System::Kubernetes,
                    Operation::Update,
                    crate::observability::metrics::error_status(&updated, Status::Error),
                );
                updated.map(|_| ()).map_err(SyncError::from)
            }
            Err(err) => {
                log_request(System::Kubernetes, Operation::Create, Status::Error);
                Err(err.into())
            }
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), SyncError> {
        debug!(secret_name = %name, namespace, "deleting cluster secret");
        match self.store.delete(namespace, name).await {
            Ok(()) => {
                log_request(System::Kubernetes, Operation::Delete, Status::Success);
                Ok(())
            }
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => {
                log_request(System::Kubernetes, Operation::Delete, Status::Error);
                Err(err.into())
            }
        }
    }
}
