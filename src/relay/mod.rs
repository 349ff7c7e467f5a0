//! Stream relay from a child process to a TCP peer.
//!
//! The relay connects to the peer, starts the child and forwards the child's
//! output (stdout, and stderr unless kept separate) to the socket. When the configured suspend token shows up in the
//! child's output, forwarding stops at the token until the peer answers with
//! the configured resume sequence.

mod buffer;
mod child;
mod delimiter;
mod error;
mod handshake;
mod resume;
mod session;
mod token;

#[cfg(test)]
mod testing;

pub use error::RelayError;
pub use session::{RelaySession, RelayStats};

use crate::config::Config;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Connect, start the child and relay its output until it closes.
///
/// The child is reaped (or killed) before returning, on success and on error.
pub async fn run(config: Config) -> Result<RelayStats, RelayError> {
    let socket = TcpStream::connect(&config.connect)
        .await
        .map_err(|source| RelayError::Connect {
            addr: config.connect.clone(),
            source,
        })?;
    if let Err(e) = socket.set_nodelay(true) {
        warn!(error = %e, "Failed to set TCP_NODELAY");
    }
    info!(peer = ?socket.peer_addr().ok(), "Connected");

    let (mut child, output) = child::spawn(&config.command, config.merge_stderr)?;
    info!(
        pid = ?child.id(),
        command = ?config.command,
        merge_stderr = config.merge_stderr,
        "Started child"
    );

    let console = config.echo.then(tokio::io::stdout);
    let result = RelaySession::new(&config, output, socket, console)
        .run()
        .await;

    child::terminate(&mut child).await;
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ResumeRule;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(addr: String, script: &str) -> Config {
        Config {
            connect: addr,
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            chunk_capacity: 4096,
            echo: false,
            merge_stderr: true,
            suspend_token: Bytes::from_static(b"ready now"),
            resume: Some(ResumeRule::Literal(Bytes::from_static(b"go"))),
            handshake_capacity: 512,
            echo_first: true,
            log_level: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn test_relays_child_output_with_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = [0u8; 4];
            stream.read_exact(&mut head).await.unwrap();
            assert_eq!(&head, b"abc ");

            stream.write_all(b"go").await.unwrap();

            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let stats = run(config(addr, "printf 'abc ready nowXYZ'"))
            .await
            .unwrap();
        let rest = peer.await.unwrap();

        assert_eq!(rest, b"ready nowXYZ");
        assert_eq!(stats.bytes_read, 16);
        assert_eq!(stats.bytes_forwarded, 16);
        assert_eq!(stats.suspensions, 1);
    }

    #[tokio::test]
    async fn test_token_on_stderr_suspends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = [0u8; 4];
            stream.read_exact(&mut head).await.unwrap();
            assert_eq!(&head, b"abc ");

            stream.write_all(b"go").await.unwrap();

            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let script = "printf 'abc '; printf 'ready now' 1>&2; printf 'XYZ'";
        let stats = run(config(addr, script)).await.unwrap();
        let rest = peer.await.unwrap();

        assert_eq!(rest, b"ready nowXYZ");
        assert_eq!(stats.suspensions, 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = run(config(addr.clone(), "true")).await.unwrap_err();
        match err {
            RelayError::Connect { addr: a, .. } => assert_eq!(a, addr),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_after_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut cfg = config(addr, "");
        cfg.command = vec!["stdio-relay-no-such-program".to_string()];

        let err = run(cfg).await.unwrap_err();
        assert!(matches!(err, RelayError::Spawn { .. }));
    }
}
