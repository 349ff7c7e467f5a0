//! Two-phase start/end marker extraction over inbound socket bytes.
//!
//! ```text
//! AwaitingStart --(start marker matched)--> AwaitingEnd --(end marker matched)--> Extracted
//! ```
//!
//! While awaiting the start marker, everything ahead of a candidate match is
//! discarded. Once the start marker is confirmed, the bytes after it are kept
//! as part of the span until the end marker completes it. The span (both
//! markers and the content between them) is what the relay echoes back.

use super::buffer::{CapacityExceeded, PendingBuffer};
use super::token::{MatchState, TokenMatcher};
use bytes::Bytes;

/// Where the extractor is in the marker sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractState {
    AwaitingStart,
    AwaitingEnd,
    Extracted,
}

/// Result of feeding inbound bytes to a resume scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// More inbound bytes are needed.
    Pending,
    /// The handshake completed.
    Complete {
        /// Matched inbound bytes.
        span: Bytes,
        /// Bytes that arrived after the span in the same feed and were dropped.
        trailing: usize,
    },
}

/// Scanner for a start marker followed by an end marker.
#[derive(Debug)]
pub struct DelimiterExtractor {
    start: TokenMatcher,
    end: TokenMatcher,
    buffer: PendingBuffer,
    state: ExtractState,
    /// Confirmed span length (start marker plus content) while awaiting the end.
    output: usize,
    /// Bytes dropped ahead of the start marker.
    removed: usize,
}

impl DelimiterExtractor {
    /// Create an extractor with a scan buffer of `capacity` bytes.
    ///
    /// `capacity` must hold at least both markers.
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>, capacity: usize) -> Self {
        let start = TokenMatcher::new(start);
        let end = TokenMatcher::new(end);
        debug_assert!(start.len() + end.len() <= capacity);

        Self {
            start,
            end,
            buffer: PendingBuffer::new(capacity),
            state: ExtractState::AwaitingStart,
            output: 0,
            removed: 0,
        }
    }

    /// Current state.
    #[cfg(test)]
    pub fn state(&self) -> ExtractState {
        self.state
    }

    /// Bytes that can be fed before the scan buffer is full.
    pub fn spare(&self) -> usize {
        self.buffer.spare()
    }

    /// Total inbound bytes discarded so far.
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Re-arm for the next handshake.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ExtractState::AwaitingStart;
        self.output = 0;
    }

    /// Feed one inbound read.
    ///
    /// Returns `Err(CapacityExceeded)` if the chunk does not fit the scan
    /// buffer; callers size their reads with [`spare`](Self::spare).
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Extraction, CapacityExceeded> {
        if self.state == ExtractState::Extracted {
            self.removed += chunk.len();
            return Ok(Extraction::Pending);
        }

        self.buffer.extend(chunk)?;

        loop {
            match self.state {
                ExtractState::AwaitingStart => {
                    let state = self.start.scan(self.buffer.as_slice());
                    let skip = state.releasable(self.buffer.len());
                    self.buffer.discard(skip);
                    self.removed += skip;

                    let MatchState::FullMatch { len, .. } = state else {
                        return Ok(Extraction::Pending);
                    };
                    self.state = ExtractState::AwaitingEnd;
                    self.output = len;
                }
                ExtractState::AwaitingEnd => {
                    let tail = &self.buffer.as_slice()[self.output..];
                    let state = self.end.scan(tail);
                    self.output += state.releasable(tail.len());

                    let MatchState::FullMatch { len, .. } = state else {
                        return Ok(Extraction::Pending);
                    };
                    let span_len = self.output + len;
                    let trailing = self.buffer.len() - span_len;
                    self.buffer.retain(span_len);
                    self.removed += trailing;
                    self.state = ExtractState::Extracted;

                    return Ok(Extraction::Complete {
                        span: self.buffer.release_all(),
                        trailing,
                    });
                }
                ExtractState::Extracted => return Ok(Extraction::Pending),
            }
        }
    }
}
