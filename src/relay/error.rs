//! Relay session errors.

use std::io;

/// Fatal conditions that end a relay session.
///
/// The child closing its output is not an error: the session returns its
/// statistics instead.
#[derive(Debug)]
pub enum RelayError {
    /// Could not connect to the peer.
    Connect { addr: String, source: io::Error },
    /// Could not start the child process.
    Spawn { program: String, source: io::Error },
    /// Reading the child's output failed.
    SourceReadFailed(io::Error),
    /// Sending to the peer failed.
    SinkWriteFailed(io::Error),
    /// Receiving from the peer failed, or the peer closed during a handshake.
    SinkReadFailed(io::Error),
    /// Held-back or scanned bytes outgrew their bounded buffer.
    BufferOverflow { capacity: usize },
}

impl RelayError {
    /// Peer closed its side while a handshake was pending.
    pub fn peer_closed() -> Self {
        RelayError::SinkReadFailed(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection during handshake",
        ))
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Connect { addr, source } => {
                write!(f, "Failed to connect to '{}': {}", addr, source)
            }
            RelayError::Spawn { program, source } => {
                write!(f, "Failed to start '{}': {}", program, source)
            }
            RelayError::SourceReadFailed(e) => write!(f, "Failed to read child output: {}", e),
            RelayError::SinkWriteFailed(e) => write!(f, "Failed to send to peer: {}", e),
            RelayError::SinkReadFailed(e) => write!(f, "Failed to receive from peer: {}", e),
            RelayError::BufferOverflow { capacity } => {
                write!(f, "Relay buffer exceeded {} bytes", capacity)
            }
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Connect { source, .. } | RelayError::Spawn { source, .. } => Some(source),
            RelayError::SourceReadFailed(e)
            | RelayError::SinkWriteFailed(e)
            | RelayError::SinkReadFailed(e) => Some(e),
            RelayError::BufferOverflow { .. } => None,
        }
    }
}
