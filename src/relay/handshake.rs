//! Suspend/resume coordination.
//!
//! ```text
//! Forwarding --(suspend token matched)--> Suspended --(resume matched)--> Forwarding
//! ```
//!
//! While suspended the coordinator owns the inbound direction of the socket.
//! The wait has no timeout; it ends on a resume match, a socket error, or
//! the peer closing.

use super::delimiter::Extraction;
use super::error::RelayError;
use super::resume::ResumeMatcher;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Forwarding state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Forwarding,
    Suspended,
}

/// What to send when a suspension ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    /// Matched inbound span to send back, if the matcher echoes.
    pub echo: Option<Bytes>,
    /// Inbound bytes read while suspended.
    pub inbound: usize,
}

/// Owns the suspend/resume state machine and the inbound matcher.
#[derive(Debug)]
pub struct HandshakeCoordinator {
    matcher: ResumeMatcher,
    state: HandshakeState,
    capacity: usize,
    read_buf: Vec<u8>,
    suspensions: u64,
}

impl HandshakeCoordinator {
    /// Create a coordinator with a scan buffer of `capacity` bytes.
    pub fn new(matcher: ResumeMatcher, capacity: usize) -> Self {
        Self {
            matcher,
            state: HandshakeState::Forwarding,
            capacity,
            read_buf: vec![0u8; capacity],
            suspensions: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Number of suspensions entered so far.
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }

    /// Inbound bytes dropped by the matcher so far.
    pub fn discarded(&self) -> usize {
        self.matcher.discarded()
    }

    /// Enter `Suspended` with `held` bytes withheld from the peer.
    pub fn suspend(&mut self, held: usize) {
        debug_assert_eq!(self.state, HandshakeState::Forwarding);
        self.matcher.reset();
        self.state = HandshakeState::Suspended;
        self.suspensions += 1;
        info!(
            held,
            resume = self.matcher.kind(),
            "Suspended forwarding, awaiting peer"
        );
    }

    /// Block on inbound reads until the resume matcher completes.
    ///
    /// Returns to `Forwarding` on success. Any read error, the peer closing,
    /// or a span larger than the scan buffer fails the session.
    pub async fn await_resume<R>(&mut self, inbound: &mut R) -> Result<Resume, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        debug_assert_eq!(self.state, HandshakeState::Suspended);
        let mut total = 0;

        loop {
            let spare = self.matcher.spare();
            if spare == 0 {
                return Err(RelayError::BufferOverflow {
                    capacity: self.capacity,
                });
            }

            let n = inbound
                .read(&mut self.read_buf[..spare])
                .await
                .map_err(RelayError::SinkReadFailed)?;
            if n == 0 {
                return Err(RelayError::peer_closed());
            }
            total += n;

            let discarded_before = self.matcher.discarded();
            let outcome = self
                .matcher
                .feed(&self.read_buf[..n])
                .map_err(|e| RelayError::BufferOverflow {
                    capacity: e.capacity,
                })?;
            let dropped = self.matcher.discarded() - discarded_before;
            if dropped > 0 {
                debug!(dropped, "Discarded inbound bytes while suspended");
            }

            if let Extraction::Complete { span, trailing } = outcome {
                self.state = HandshakeState::Forwarding;
                info!(
                    inbound = total,
                    span = span.len(),
                    trailing,
                    "Resume handshake matched"
                );
                let echo = self.matcher.echoes().then_some(span);
                return Ok(Resume {
                    echo,
                    inbound: total,
                });
            }
        }
    }
}
