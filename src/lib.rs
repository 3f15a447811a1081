//! # hunter2
//!
//! A one-way mirror from Google Secret Manager into Kubernetes.
//!
//! Secret Manager audit events arrive on a Pub/Sub subscription; for
//! each event the synchronizer resolves the owning cluster namespace,
//! fetches the current upstream secret, and creates, updates or deletes
//! the corresponding opaque cluster secret. Secrets opt into mirroring
//! with the upstream label `sync=true`; mirrored objects are marked
//! with `nais.io/created-by=hunter2` and never touched otherwise.

pub mod cli;
pub mod constants;
pub mod envelope;
pub mod kubernetes;
pub mod observability;
pub mod payload;
pub mod provider;
pub mod runtime;
pub mod server;
pub mod synchronizer;
