//! # Constants
//!
//! Shared defaults and deadlines used throughout the controller.

use std::time::Duration;

/// Deadline for processing a single subscription message
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for listing managed secrets during a report tick
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before reconnecting after the subscription pull fails
pub const PULL_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Maximum number of messages fetched per subscription pull
pub const PULL_BATCH_SIZE: u32 = 10;

/// Secret version recorded when the audit record identifies a secret
/// without naming a specific version
pub const DEFAULT_SECRET_VERSION: &str = "1";
