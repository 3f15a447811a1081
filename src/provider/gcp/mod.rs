//! # Google Cloud Clients
//!
//! Native REST implementations for the Google services this controller
//! talks to:
//!
//! - Secret Manager: source of truth for secret material
//! - Pub/Sub: delivery of Secret Manager audit events
//!
//! Both use reqwest with rustls and OAuth2 bearer tokens from the GCE
//! metadata server (Workload Identity).

mod auth;
pub mod pubsub;
pub mod secret_manager;

pub use pubsub::{Acknowledge, IncomingMessage, PubSubConsumer};
pub use secret_manager::SecretManagerSource;
