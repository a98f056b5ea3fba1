//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin and
//! writes `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout. Stdout carries nothing else; diagnostics go to stderr.

use crate::error::{BuddyError, Result};
use crate::host::channel::{HostCommandClient, HostHandler, command_channel};
use crate::host::contract::{CommandEnvelope, EventEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, broadcast};

const REQUEST_CAPACITY: usize = 64;

/// Run the bridge on the process's stdin and stdout until stdin closes.
pub async fn run_stdio_bridge<H: HostHandler>(
    handler: Arc<H>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> Result<()> {
    run_bridge(
        handler,
        event_tx,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge over any line reader and writer.
///
/// Three tasks: the command router, an event forwarder, and the reader on
/// the current task. The bridge ends when the reader hits EOF.
pub async fn run_bridge<H, R, W>(
    handler: Arc<H>,
    event_tx: broadcast::Sender<EventEnvelope>,
    reader: R,
    writer: W,
) -> Result<()>
where
    H: HostHandler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, server) = command_channel(REQUEST_CAPACITY, event_tx, handler);
    let writer = Arc::new(Mutex::new(writer));

    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "event write failed; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to serialize event; skipping"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let reader_result = run_reader(client, reader, Arc::clone(&writer)).await;

    // Give already-queued events a chance to reach the shell.
    tokio::task::yield_now().await;
    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    client: HostCommandClient,
    mut reader: R,
    writer: Arc<Mutex<W>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| BuddyError::Channel(format!("failed to read from stdin: {e}")))?;
        if bytes_read == 0 {
            tracing::info!("stdin closed; shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => {
                let request_id = envelope.request_id.clone();
                match client.send(envelope).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(error = %e, "host command rejected");
                        ResponseEnvelope::from_result(request_id, Err(e))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse command envelope");
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        let json = serde_json::to_string(&response)
            .map_err(|e| BuddyError::Channel(format!("failed to serialize response: {e}")))?;
        let mut w = writer.lock().await;
        write_line(&mut *w, &json).await?;
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
