//! Bounded byte buffers for the relay.
//!
//! `PendingBuffer` holds bytes that were read but not yet released to the
//! peer: a candidate partial match of a token, or the held-back region of a
//! suspension. Memory stays bounded by a fixed capacity set at construction;
//! bytes leave the buffer only through explicit `release`/`discard` calls so
//! the read/forward accounting can be checked at any point.

use bytes::{Bytes, BytesMut};

/// Error returned when an append would exceed the buffer bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    /// Configured bound in bytes.
    pub capacity: usize,
}

/// Owned, bounded byte buffer with explicit release and retain operations.
#[derive(Debug)]
pub struct PendingBuffer {
    data: BytesMut,
    capacity: usize,
}

impl PendingBuffer {
    /// Create an empty buffer that never holds more than `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk.
    ///
    /// Returns `Err(CapacityExceeded)` and leaves the buffer unchanged if the
    /// chunk does not fit.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<(), CapacityExceeded> {
        if self.data.len() + chunk.len() > self.capacity {
            return Err(CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Split off the first `n` bytes for forwarding.
    ///
    /// # Panics
    /// Panics if `n` exceeds the buffered length.
    pub fn release(&mut self, n: usize) -> Bytes {
        self.data.split_to(n).freeze()
    }

    /// Release everything buffered.
    pub fn release_all(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    /// Drop the first `n` bytes without forwarding them.
    pub fn discard(&mut self, n: usize) {
        let _ = self.data.split_to(n);
    }

    /// Keep only the first `n` bytes, dropping the tail.
    pub fn retain(&mut self, n: usize) {
        self.data.truncate(n);
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that can still be appended.
    pub fn spare(&self) -> usize {
        self.capacity - self.data.len()
    }
}
