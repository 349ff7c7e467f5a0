//! stdio-relay: forward a child process's output to a TCP peer
//!
//! The relay runs a command, streams its stdout to a remote peer and
//! optionally pauses at a suspend token until the peer sends a resume
//! sequence back.
//!
//! Features:
//! - Token matching across arbitrary read boundaries
//! - Literal or start/end delimited resume handshakes
//! - Local echo of the child's output
//! - Configuration via CLI arguments or TOML file

mod config;
mod relay;

use config::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout carries the child's echoed output
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        connect = %config.connect,
        command = ?config.command,
        chunk_capacity = config.chunk_capacity,
        handshake_capacity = config.handshake_capacity,
        suspend_token = %config.suspend_token.escape_ascii(),
        echo = config.echo,
        "Starting stdio-relay"
    );
    if !config.suspension_enabled() {
        if config.resume.is_some() {
            warn!("Resume rule set without a suspend token, it will never be used");
        }
        info!("Passthrough mode, no handshakes");
    }

    match relay::run(config).await {
        Ok(stats) => {
            info!(
                bytes_forwarded = stats.bytes_forwarded,
                suspensions = stats.suspensions,
                "Relay complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Relay failed");
            Err(e.into())
        }
    }
}
