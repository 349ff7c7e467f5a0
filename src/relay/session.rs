//! Relay session: pumps the local byte source into the socket.
//!
//! Every chunk read from the source is echoed to the console, appended to
//! the pending buffer and scanned for the suspend token. The prefix that
//! cannot belong to the token is sent at once; a candidate partial match is
//! held until the next chunk decides it. On a full match the session hands
//! the socket's inbound side to the handshake coordinator. Once the peer's
//! resume arrives the token is sent and the bytes held behind it are
//! scanned again like a fresh chunk.
//!
//! Reads from the source and from the socket happen on the same task and
//! never overlap, so matcher and buffer state need no locking.

use super::buffer::PendingBuffer;
use super::error::RelayError;
use super::handshake::{HandshakeCoordinator, HandshakeState};
use super::resume::ResumeMatcher;
use super::token::{MatchState, TokenMatcher};
use crate::config::Config;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Byte counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes read from the local source.
    pub bytes_read: u64,
    /// Source bytes sent to the peer.
    pub bytes_forwarded: u64,
    /// Times forwarding was suspended.
    pub suspensions: u64,
    /// Bytes read from the peer during handshakes.
    pub inbound_read: u64,
    /// Inbound bytes dropped by the resume matcher.
    pub inbound_discarded: u64,
    /// Matched inbound bytes echoed back to the peer.
    pub bytes_echoed: u64,
}

/// One relay from a local byte source to a socket.
pub struct RelaySession<R, S, W> {
    source: R,
    socket: S,
    console: Option<W>,
    matcher: TokenMatcher,
    pending: PendingBuffer,
    handshake: Option<HandshakeCoordinator>,
    chunk: Vec<u8>,
    echo_first: bool,
    stats: RelayStats,
}

impl<R, S, W> RelaySession<R, S, W>
where
    R: AsyncRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a session from a validated configuration.
    ///
    /// Without a resume rule the session never suspends.
    pub fn new(config: &Config, source: R, socket: S, console: Option<W>) -> Self {
        let handshake = match &config.resume {
            Some(rule) if config.suspension_enabled() => Some(HandshakeCoordinator::new(
                ResumeMatcher::from_rule(rule, config.handshake_capacity),
                config.handshake_capacity,
            )),
            _ => None,
        };
        let matcher = if handshake.is_some() {
            TokenMatcher::new(config.suspend_token.clone())
        } else {
            TokenMatcher::new(Bytes::new())
        };
        if matcher.is_empty() {
            debug!("No suspend token, forwarding without handshakes");
        }

        Self {
            source,
            socket,
            console,
            pending: PendingBuffer::new(config.chunk_capacity + matcher.len()),
            matcher,
            handshake,
            chunk: vec![0u8; config.chunk_capacity],
            echo_first: config.echo_first,
            stats: RelayStats::default(),
        }
    }

    /// Run until the source is exhausted or a fatal error occurs.
    ///
    /// On success all pending bytes have been flushed and the socket's write
    /// side is shut down.
    pub async fn run(mut self) -> Result<RelayStats, RelayError> {
        loop {
            let n = match self.source.read(&mut self.chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                // Child exited and its pipe closed
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(error = %e, "Source pipe closed");
                    break;
                }
                Err(e) => return Err(RelayError::SourceReadFailed(e)),
            };
            self.stats.bytes_read += n as u64;
            self.echo_local(n).await;

            self.pending
                .extend(&self.chunk[..n])
                .map_err(|e| RelayError::BufferOverflow {
                    capacity: e.capacity,
                })?;

            self.drain_pending().await?;

            debug_assert_eq!(
                self.stats.bytes_read,
                self.stats.bytes_forwarded + self.pending.len() as u64
            );
        }

        // Source exhausted: a held partial match can no longer complete
        if !self.pending.is_empty() {
            debug!(held = self.pending.len(), "Flushing unmatched tail");
        }
        let rest = self.pending.release_all();
        self.forward(&rest).await?;
        self.socket
            .shutdown()
            .await
            .map_err(RelayError::SinkWriteFailed)?;

        if let Some(handshake) = &self.handshake {
            self.stats.suspensions = handshake.suspensions();
            self.stats.inbound_discarded = handshake.discarded() as u64;
        }
        info!(
            bytes_read = self.stats.bytes_read,
            bytes_forwarded = self.stats.bytes_forwarded,
            suspensions = self.stats.suspensions,
            inbound_read = self.stats.inbound_read,
            inbound_discarded = self.stats.inbound_discarded,
            bytes_echoed = self.stats.bytes_echoed,
            "Source closed, relay finished"
        );
        Ok(self.stats)
    }

    /// Forward everything in the pending buffer that cannot start the token.
    ///
    /// Each full match suspends forwarding. After the resume, only the token
    /// itself is replayed and the bytes behind it are scanned again, so later
    /// tokens in the same chunk, or a token that starts in the replayed tail
    /// and ends in the next chunk, suspend as well. On return the buffer
    /// holds at most a partial match.
    async fn drain_pending(&mut self) -> Result<(), RelayError> {
        let mut deferred_echo: Option<Bytes> = None;
        loop {
            let state = self.matcher.scan(self.pending.as_slice());
            let ready = self.pending.release(state.releasable(self.pending.len()));
            self.forward(&ready).await?;

            // Replay-first mode sends the span once the replayed run is out
            if let Some(span) = deferred_echo.take() {
                self.echo_peer(&span).await?;
            }

            let MatchState::FullMatch { len, .. } = state else {
                return Ok(());
            };
            deferred_echo = self.suspend_and_resume(len).await?;
        }
    }

    /// Wait for the peer's resume, then replay the `token_len` byte token at
    /// the head of the pending buffer.
    ///
    /// Returns the matched span when it must be echoed after the replay.
    async fn suspend_and_resume(
        &mut self,
        token_len: usize,
    ) -> Result<Option<Bytes>, RelayError> {
        let Some(handshake) = self.handshake.as_mut() else {
            let token = self.pending.release(token_len);
            self.forward(&token).await?;
            return Ok(None);
        };

        handshake.suspend(self.pending.len());
        let resume = handshake.await_resume(&mut self.socket).await?;
        debug_assert_eq!(handshake.state(), HandshakeState::Forwarding);
        self.stats.inbound_read += resume.inbound as u64;

        let token = self.pending.release(token_len);
        let deferred = match resume.echo {
            Some(span) if self.echo_first => {
                self.echo_peer(&span).await?;
                None
            }
            echo => echo,
        };
        self.forward(&token).await?;

        info!(held = self.pending.len(), "Resumed forwarding");
        Ok(deferred)
    }

    /// Send source bytes to the peer.
    async fn forward(&mut self, data: &[u8]) -> Result<(), RelayError> {
        if data.is_empty() {
            return Ok(());
        }
        send_all(&mut self.socket, data).await?;
        self.stats.bytes_forwarded += data.len() as u64;
        Ok(())
    }

    /// Send a matched inbound span back to the peer.
    async fn echo_peer(&mut self, span: &[u8]) -> Result<(), RelayError> {
        send_all(&mut self.socket, span).await?;
        self.stats.bytes_echoed += span.len() as u64;
        Ok(())
    }

    /// Copy the last chunk to the local console.
    async fn echo_local(&mut self, n: usize) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        let data = &self.chunk[..n];
        let result = async {
            console.write_all(data).await?;
            console.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Console echo failed, disabling echo");
            self.console = None;
        }
    }
}

/// Write all of `data`, retrying short writes.
async fn send_all<S>(socket: &mut S, data: &[u8]) -> Result<(), RelayError>
where
    S: AsyncWrite + Unpin,
{
    let total = data.len();
    let mut written = 0;

    while written < total {
        let n = socket
            .write(&data[written..])
            .await
            .map_err(RelayError::SinkWriteFailed)?;
        if n == 0 {
            return Err(RelayError::SinkWriteFailed(io::ErrorKind::WriteZero.into()));
        }
        written += n;
        if written < total {
            trace!(written, total, "Short write to peer");
        }
    }

    socket.flush().await.map_err(RelayError::SinkWriteFailed)
}
