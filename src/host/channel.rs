//! Host command channel and router for native shell integrations.
//!
//! Commands are handled one at a time, in arrival order, so a shell sees
//! session changes in the order it requested them.

use crate::error::{BuddyError, Result};
use crate::host::contract::{
    CommandEnvelope, CommandName, EVENT_VERSION, EventEnvelope, ResponseEnvelope,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

/// Executes host commands against the companion core.
#[async_trait]
pub trait HostHandler: Send + Sync + 'static {
    /// Run `command` and return its response payload.
    async fn handle(&self, command: CommandName, payload: &serde_json::Value)
    -> Result<serde_json::Value>;
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Submit a command and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Validation`] for a malformed envelope and
    /// [`BuddyError::Channel`] if the server has gone away.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            BuddyError::Validation(format!(
                "invalid host command envelope {}: {e}",
                envelope.request_id
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| BuddyError::Channel(format!("failed to send host command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| BuddyError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: HostHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    handler: Arc<H>,
}

/// Create a client/server pair sharing `event_tx` with the handler, so
/// events the handler emits reach the same subscribers.
#[must_use]
pub fn command_channel<H: HostHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: Arc<H>,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            handler,
        },
    )
}

impl<H: HostHandler> HostCommandServer<H> {
    /// Serve requests until every client is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope).await;
            let _ = request.response_tx.send(response);
        }
        debug!("host command channel closed");
    }

    /// Route a command envelope to the handler.
    pub async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        let request_id = envelope.request_id.clone();
        debug!(request_id = %request_id, command = envelope.command.as_str(), "host command");
        match envelope.command {
            CommandName::HostPing => {
                ResponseEnvelope::ok(request_id, serde_json::json!({"pong": true}))
            }
            CommandName::HostVersion => ResponseEnvelope::ok(
                request_id,
                serde_json::json!({
                    "contract_version": EVENT_VERSION,
                    "crate_version": env!("CARGO_PKG_VERSION"),
                }),
            ),
            command => {
                let result = self.handler.handle(command, &envelope.payload).await;
                if let Err(ref e) = result {
                    debug!(command = command.as_str(), error = %e, "host command failed");
                }
                ResponseEnvelope::from_result(request_id, result)
            }
        }
    }
}
