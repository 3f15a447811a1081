//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `hunter2_requests` - Cumulative number of reconciliation requests,
//!   labeled by system, operation and outcome status
//! - `hunter2_secret_manager_response_time` - Response time for calls to
//!   Google Secret Manager
//! - `hunter2_managed_secrets` - Current number of cluster secrets owned
//!   by the controller

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("requests", "Cumulative number of reconciliation requests").namespace("hunter2"),
        &["operation", "status", "system"],
    )
    .expect("Failed to create REQUESTS metric - this should never happen")
});

static SECRET_MANAGER_RESPONSE_TIME: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "secret_manager_response_time",
            "Response time for calls to Google Secret Manager",
        )
        .namespace("hunter2"),
    )
    .expect("Failed to create SECRET_MANAGER_RESPONSE_TIME metric - this should never happen")
});

static MANAGED_SECRETS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "managed_secrets",
            "Current number of cluster secrets owned by the controller",
        )
        .namespace("hunter2"),
    )
    .expect("Failed to create MANAGED_SECRETS metric - this should never happen")
});

/// External system a request was issued against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Kubernetes,
    PubSub,
    SecretManager,
}

impl System {
    pub fn as_str(self) -> &'static str {
        match self {
            System::Kubernetes => "kubernetes",
            System::PubSub => "pubsub",
            System::SecretManager => "secret_manager",
        }
    }
}

/// Kind of operation performed against an external system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    NotManaged,
    InvalidData,
    NoSyncLabel,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
            Status::NotManaged => "not_managed",
            Status::InvalidData => "invalid_data",
            Status::NoSyncLabel => "no_sync_label",
        }
    }
}

const ALL_SYSTEMS: [System; 3] = [System::Kubernetes, System::PubSub, System::SecretManager];
const ALL_OPERATIONS: [Operation; 4] = [
    Operation::Create,
    Operation::Read,
    Operation::Update,
    Operation::Delete,
];
const ALL_STATUSES: [Status; 5] = [
    Status::Success,
    Status::Error,
    Status::NotManaged,
    Status::InvalidData,
    Status::NoSyncLabel,
];

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REQUESTS.clone()))?;
    REGISTRY.register(Box::new(SECRET_MANAGER_RESPONSE_TIME.clone()))?;
    REGISTRY.register(Box::new(MANAGED_SECRETS.clone()))?;

    Ok(())
}

/// Zero out all possible label combinations so every series exists
/// from the first scrape
pub fn init_labels() {
    for status in ALL_STATUSES {
        for system in ALL_SYSTEMS {
            for operation in ALL_OPERATIONS {
                let _ = REQUESTS.with_label_values(&[
                    operation.as_str(),
                    status.as_str(),
                    system.as_str(),
                ]);
            }
        }
    }
}

pub fn log_request(system: System, operation: Operation, status: Status) {
    REQUESTS
        .with_label_values(&[operation.as_str(), status.as_str(), system.as_str()])
        .inc();
}

/// Map a result to `Status::Success` or the given fallback status
pub fn error_status<T, E>(result: &std::result::Result<T, E>, fallback: Status) -> Status {
    if result.is_ok() {
        Status::Success
    } else {
        fallback
    }
}

pub fn observe_secret_manager_response_time(seconds: f64) {
    SECRET_MANAGER_RESPONSE_TIME.observe(seconds);
}

pub fn set_managed_secrets(count: i64) {
    MANAGED_SECRETS.set(count);
}
