//! # Configuration
//!
//! Command-line flags for the controller. Every flag can also be set
//! through the environment with the `HUNTER2_` prefix and dashes
//! replaced by underscores (e.g. `HUNTER2_BIND_ADDRESS`).

use std::sync::LazyLock;
use std::time::Duration;

use clap::Parser;
use regex::Regex;

/// Controller configuration
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hunter2",
    about = "Mirrors Google Secret Manager secrets into Kubernetes secrets",
    version
)]
pub struct Config {
    /// Listen address for the health and metrics endpoints
    #[arg(long, env = "HUNTER2_BIND_ADDRESS", default_value = "127.0.0.1:8080")]
    pub bind_address: String,

    /// Enable debug logging
    #[arg(long, env = "HUNTER2_DEBUG")]
    pub debug: bool,

    /// Google project id that owns the Pub/Sub subscription
    #[arg(long, env = "HUNTER2_GOOGLE_PROJECT_ID")]
    pub google_project_id: String,

    /// Pub/Sub subscription delivering Secret Manager audit events
    #[arg(long, env = "HUNTER2_GOOGLE_PUBSUB_SUBSCRIPTION_ID")]
    pub google_pubsub_subscription_id: String,

    /// Path to a kubeconfig file; the in-cluster configuration is used when unset
    #[arg(long, env = "HUNTER2_KUBECONFIG_PATH")]
    pub kubeconfig_path: Option<String>,

    /// Interval between managed-secret count reports
    #[arg(
        long,
        env = "HUNTER2_REPORT_INTERVAL",
        default_value = "5m",
        value_parser = parse_interval
    )]
    pub report_interval: Duration,
}

static INTERVAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$").expect("interval pattern must compile")
});

/// Parse a duration of the form `<number><unit>` where the unit is one
/// of `s`, `m`, `h` or `d`.
fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim().to_lowercase();
    let captures = INTERVAL_PATTERN.captures(&raw).ok_or_else(|| {
        format!("invalid duration {raw:?}: expected <number><unit> with unit s, m, h or d")
    })?;

    let number: u64 = captures["number"]
        .parse()
        .map_err(|err| format!("invalid duration number: {err}"))?;
    if number == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    let seconds = match &captures["unit"] {
        "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        "d" => number * 86400,
        unit => return Err(format!("invalid duration unit {unit:?}")),
    };

    Ok(Duration::from_secs(seconds))
}
