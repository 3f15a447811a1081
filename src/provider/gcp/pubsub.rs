//! # Pub/Sub Consumer
//!
//! Pulls Secret Manager audit events from a Pub/Sub subscription over
//! the REST API and hands them to the synchronizer as
//! [`IncomingMessage`] values on a channel.
//!
//! The pull loop reconnects after a fixed delay when a pull fails, and
//! terminates when the shutdown channel flips or the receiver is
//! dropped. Acknowledgement is a linear capability: a message carries
//! one token, consumed by at most one `ack` call; dropping the message
//! without acking leaves it on the subscription for redelivery.
//!
//! Reference: <https://cloud.google.com/pubsub/docs/reference/rest>

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::auth;
use crate::constants::{PULL_BATCH_SIZE, PULL_RECONNECT_DELAY};

const DEFAULT_BASE_URL: &str = "https://pubsub.googleapis.com";

/// Acknowledgement capability of a single message
#[async_trait]
pub trait Acknowledge: Send {
    /// Remove the message from the subscription. Consumes the token so
    /// each message is acknowledged at most once.
    async fn ack(self: Box<Self>);
}

/// One message pulled from the subscription
pub struct IncomingMessage {
    pub data: Vec<u8>,
    token: Box<dyn Acknowledge>,
}

impl IncomingMessage {
    pub fn new(data: Vec<u8>, token: Box<dyn Acknowledge>) -> Self {
        Self { data, token }
    }

    /// Acknowledge the message, consuming it
    pub async fn ack(self) {
        self.token.ack().await;
    }
}

#[derive(Debug, Default, Deserialize)]
struct PullResponse {
    #[serde(rename = "receivedMessages", default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
struct ReceivedMessage {
    #[serde(rename = "ackId")]
    ack_id: String,
    #[serde(default)]
    message: PubsubMessage,
}

#[derive(Debug, Default, Deserialize)]
struct PubsubMessage {
    #[serde(default)]
    data: String,
    #[serde(rename = "messageId", default)]
    message_id: String,
}

/// Pull-based consumer for one subscription
pub struct PubSubConsumer {
    http_client: Client,
    base_url: String,
    access_token: String,
    subscription_path: String,
}

impl PubSubConsumer {
    /// Create a consumer authenticated via the metadata server
    pub async fn new(project_id: &str, subscription_id: &str) -> Result<Self> {
        let http_client = Client::builder()
            .build()
            .context("creating pubsub http client")?;
        let access_token = auth::fetch_access_token(&http_client).await?;

        Ok(Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token,
            subscription_path: format!("projects/{project_id}/subscriptions/{subscription_id}"),
        })
    }

    /// Spawn the pull loop and return the message channel. The loop
    /// ends, closing the channel, when `shutdown` flips or the
    /// receiving side goes away.
    pub fn consume(self, mut shutdown: watch::Receiver<bool>) -> mpsc::Receiver<IncomingMessage> {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            info!(subscription = %self.subscription_path, "starting subscription pull loop");
            loop {
                let pulled = tokio::select! {
                    _ = shutdown.changed() => {
                        info!("shutdown signalled, closing subscription pull loop");
                        return;
                    }
                    pulled = self.pull() => pulled,
                };

                match pulled {
                    Ok(messages) => {
                        for message in messages {
                            if let Some(incoming) = self.decode_message(message).await {
                                if tx.send(incoming).await.is_err() {
                                    info!("message channel closed, stopping pull loop");
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "pulling from subscription failed, reconnecting");
                        tokio::select! {
                            _ = shutdown.changed() => {
                                info!("shutdown signalled, closing subscription pull loop");
                                return;
                            }
                            _ = tokio::time::sleep(PULL_RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        });

        rx
    }

    async fn pull(&self) -> Result<Vec<ReceivedMessage>> {
        let url = format!("{}/v1/{}:pull", self.base_url, self.subscription_path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "maxMessages": PULL_BATCH_SIZE }))
            .send()
            .await
            .context("pull request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("pull returned {status}: {body}");
        }

        let pulled: PullResponse = response.json().await.context("parsing pull response")?;
        Ok(pulled.received_messages)
    }

    /// Decode one pulled message. A message whose payload is not valid
    /// base64 can never be processed, so it is acknowledged and dropped
    /// here instead of being redelivered forever.
    async fn decode_message(&self, received: ReceivedMessage) -> Option<IncomingMessage> {
        let token = Box::new(PubSubAckToken {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            access_token: self.access_token.clone(),
            subscription_path: self.subscription_path.clone(),
            ack_id: received.ack_id,
        });

        match general_purpose::STANDARD.decode(received.message.data.as_bytes()) {
            Ok(data) => {
                debug!(message_id = %received.message.message_id, "pulled message");
                Some(IncomingMessage::new(data, token))
            }
            Err(err) => {
                warn!(
                    message_id = %received.message.message_id,
                    error = %err,
                    "dropping message with undecodable payload"
                );
                token.ack().await;
                None
            }
        }
    }
}

struct PubSubAckToken {
    http_client: Client,
    base_url: String,
    access_token: String,
    subscription_path: String,
    ack_id: String,
}

#[async_trait]
impl Acknowledge for PubSubAckToken {
    async fn ack(self: Box<Self>) {
        let PubSubAckToken {
            http_client,
            base_url,
            access_token,
            subscription_path,
            ack_id,
        } = *self;

        let url = format!("{base_url}/v1/{subscription_path}:acknowledge");
        let result = http_client
            .post(&url)
            .bearer_auth(&access_token)
            .json(&json!({ "ackIds": [ack_id] }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "acknowledge request rejected");
            }
            Err(err) => {
                warn!(error = %err, "acknowledge request failed");
            }
        }
    }
}
