//! # Initialization
//!
//! Startup wiring: rustls setup, tracing, metrics, the HTTP server,
//! clients for Google and the cluster, and the shutdown signal.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::cli::Config;
use crate::kubernetes;
use crate::kubernetes::namespaces::{KubeNamespaceLister, ProjectNamespaces};
use crate::kubernetes::secrets::KubeSecretStore;
use crate::observability::metrics;
use crate::provider::gcp::{IncomingMessage, PubSubConsumer, SecretManagerSource};
use crate::server;
use crate::synchronizer::Synchronizer;

/// Everything the coordinator loop needs to run
pub struct Runtime {
    pub synchronizer: Synchronizer,
    pub messages: mpsc::Receiver<IncomingMessage>,
    pub shutdown: watch::Receiver<bool>,
    pub report_interval: Duration,
}

/// Initialize the controller runtime
pub async fn initialize(config: &Config) -> Result<Runtime> {
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let default_directive = if config.debug {
        "hunter2=debug"
    } else {
        "hunter2=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .init();

    info!("starting hunter2");

    metrics::register_metrics().context("registering metrics")?;
    metrics::init_labels();

    let listener = server::bind(&config.bind_address).await?;
    tokio::spawn(async move {
        if let Err(err) = server::serve(listener).await {
            error!(error = %err, "http server terminated");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("received shutdown signal, terminating");
        let _ = shutdown_tx.send(true);
    });

    let client = kubernetes::create_client(config.kubeconfig_path.as_deref()).await?;

    let source = SecretManagerSource::new()
        .await
        .context("creating secret manager client")?;

    let consumer = PubSubConsumer::new(
        &config.google_project_id,
        &config.google_pubsub_subscription_id,
    )
    .await
    .context("creating pubsub consumer")?;
    let messages = consumer.consume(shutdown_rx.clone());

    let synchronizer = Synchronizer::new(
        Box::new(source),
        Box::new(KubeSecretStore::new(client.clone())),
        ProjectNamespaces::new(Box::new(KubeNamespaceLister::new(client))),
    );

    Ok(Runtime {
        synchronizer,
        messages,
        shutdown: shutdown_rx,
        report_interval: config.report_interval,
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
