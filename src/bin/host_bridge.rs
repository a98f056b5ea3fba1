//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin and
//! writes `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing output goes to stderr so that stdout remains a clean JSON
//! protocol channel. The configuration file is taken from `BUDDY_CONFIG`,
//! falling back to the platform config directory.

use buddy::config::BuddyConfig;
use buddy::host::BuddyHost;
use buddy::host::stdio::run_stdio_bridge;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EVENT_CAPACITY: usize = 128;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("BUDDY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(BuddyConfig::default_config_path);
    let config = BuddyConfig::load_or_default(&config_path)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("buddy={}", config.logging.level))),
        )
        .init();

    tracing::info!(
        config = %config_path.display(),
        backend = ?config.backend.mode,
        "buddy-host starting"
    );

    let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CAPACITY);
    let host = Arc::new(BuddyHost::from_config(config, event_tx.clone())?);

    run_stdio_bridge(host, event_tx).await.map_err(|e| {
        tracing::error!(error = %e, "buddy-host exited with error");
        anyhow::anyhow!("buddy-host failed: {e}")
    })?;

    tracing::info!("buddy-host shut down cleanly");
    Ok(())
}
