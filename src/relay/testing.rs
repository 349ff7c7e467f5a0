//! Scripted socket peer for relay tests.
//!
//! Records every read and write in order so tests can check what the relay
//! sent relative to what it received.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// One I/O operation as seen from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Bytes the relay read from the peer.
    Received(Vec<u8>),
    /// Bytes the relay wrote to the peer.
    Sent(Vec<u8>),
}

pub struct ScriptedPeer {
    inbound: VecDeque<io::Result<Vec<u8>>>,
    max_write: usize,
    fail_writes_after: Option<usize>,
    written: usize,
    events: Vec<PeerEvent>,
    shutdown: bool,
}

impl ScriptedPeer {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            max_write: usize::MAX,
            fail_writes_after: None,
            written: 0,
            events: Vec::new(),
            shutdown: false,
        }
    }

    /// Queue one inbound read. Once the queue is empty reads return EOF.
    pub fn inbound(mut self, chunk: &[u8]) -> Self {
        self.inbound.push_back(Ok(chunk.to_vec()));
        self
    }

    /// Queue an inbound read error.
    pub fn inbound_error(mut self, kind: io::ErrorKind) -> Self {
        self.inbound
            .push_back(Err(io::Error::new(kind, "scripted read failure")));
        self
    }

    /// Accept at most `n` bytes per write call.
    pub fn max_write(mut self, n: usize) -> Self {
        self.max_write = n;
        self
    }

    /// Fail every write once `n` bytes have been accepted.
    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.fail_writes_after = Some(n);
        self
    }

    /// All bytes written, concatenated.
    pub fn sent(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PeerEvent::Sent(data) => Some(data.as_slice()),
                PeerEvent::Received(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Events with consecutive operations of the same kind merged.
    pub fn timeline(&self) -> Vec<PeerEvent> {
        let mut merged: Vec<PeerEvent> = Vec::new();
        for event in &self.events {
            match (merged.last_mut(), event) {
                (Some(PeerEvent::Sent(acc)), PeerEvent::Sent(data))
                | (Some(PeerEvent::Received(acc)), PeerEvent::Received(data)) => {
                    acc.extend_from_slice(data)
                }
                _ => merged.push(event.clone()),
            }
        }
        merged
    }

    /// Number of individual write calls that accepted bytes.
    pub fn write_calls(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PeerEvent::Sent(_)))
            .count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }
}

impl AsyncRead for ScriptedPeer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.inbound.pop_front() {
            None => Poll::Ready(Ok(())),
            Some(Err(e)) => Poll::Ready(Err(e)),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.remaining());
                let rest = chunk.split_off(n);
                if !rest.is_empty() {
                    this.inbound.push_front(Ok(rest));
                }
                buf.put_slice(&chunk);
                this.events.push(PeerEvent::Received(chunk));
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl AsyncWrite for ScriptedPeer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut n = buf.len().min(this.max_write);
        if let Some(limit) = this.fail_writes_after {
            if this.written >= limit {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "scripted write failure",
                )));
            }
            n = n.min(limit - this.written);
        }
        this.written += n;
        this.events.push(PeerEvent::Sent(buf[..n].to_vec()));
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().shutdown = true;
        Poll::Ready(Ok(()))
    }
}
