//! # Coordinator Loop
//!
//! Multiplexes the message channel, the report tick and the shutdown
//! signal. Reconciliation is strictly sequential: at most one `sync`
//! call is in flight, and report ticks never overlap with event work.

use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info};

use super::initialization::Runtime;
use crate::constants::{REPORT_TIMEOUT, SYNC_TIMEOUT};
use crate::observability::metrics;
use crate::synchronizer::Synchronizer;

/// Run the coordinator until shutdown or the message channel closes
pub async fn run_sync_loop(runtime: Runtime) -> anyhow::Result<()> {
    let Runtime {
        mut synchronizer,
        mut messages,
        mut shutdown,
        report_interval,
    } = runtime;

    let mut report_timer = tokio::time::interval(report_interval);
    report_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown signalled, stopping synchronizer loop");
                break;
            }
            maybe_msg = messages.recv() => match maybe_msg {
                Some(msg) => match timeout(SYNC_TIMEOUT, synchronizer.sync(msg)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(error = %err, "message synchronization failed"),
                    Err(_) => error!(
                        "message synchronization timed out after {:?}, leaving message unacked",
                        SYNC_TIMEOUT
                    ),
                },
                None => {
                    info!("message channel closed, stopping synchronizer loop");
                    break;
                }
            },
            _ = report_timer.tick() => report_managed_secrets(&synchronizer).await,
        }
    }

    info!("synchronizer stopped");
    Ok(())
}

async fn report_managed_secrets(synchronizer: &Synchronizer) {
    match timeout(REPORT_TIMEOUT, synchronizer.managed_secret_count()).await {
        Ok(Ok(count)) => {
            metrics::set_managed_secrets(count as i64);
            debug!(count, "reported managed secret count");
        }
        Ok(Err(err)) => error!(error = %err, "listing managed secrets failed"),
        Err(_) => error!("listing managed secrets timed out after {:?}", REPORT_TIMEOUT),
    }
}
