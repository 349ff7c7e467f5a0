//! Inbound resume matchers.
//!
//! A suspension ends when the peer sends either a literal token
//! (`LiteralToken`) or a start/end delimited span (`DelimiterPair`). Only the
//! delimited span is echoed back to the peer.

use super::buffer::{CapacityExceeded, PendingBuffer};
use super::delimiter::{DelimiterExtractor, Extraction};
use super::token::{MatchState, TokenMatcher};
use crate::config::ResumeRule;

/// Literal token scanner for the inbound side.
///
/// Inbound bytes that cannot be part of the token are dropped, not buffered
/// and not echoed.
#[derive(Debug)]
pub struct LiteralScan {
    matcher: TokenMatcher,
    buffer: PendingBuffer,
    discarded: usize,
}

impl LiteralScan {
    /// Create a scanner for `matcher` with a scan buffer of `capacity` bytes.
    pub fn new(matcher: TokenMatcher, capacity: usize) -> Self {
        debug_assert!(matcher.len() <= capacity);
        Self {
            matcher,
            buffer: PendingBuffer::new(capacity),
            discarded: 0,
        }
    }

    /// Feed one inbound read, dropping bytes that cannot start the token.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Extraction, CapacityExceeded> {
        self.buffer.extend(chunk)?;

        let state = self.matcher.scan(self.buffer.as_slice());
        let skip = state.releasable(self.buffer.len());
        self.buffer.discard(skip);
        self.discarded += skip;

        let MatchState::FullMatch { len, .. } = state else {
            return Ok(Extraction::Pending);
        };
        let trailing = self.buffer.len() - len;
        self.buffer.retain(len);
        self.discarded += trailing;

        Ok(Extraction::Complete {
            span: self.buffer.release_all(),
            trailing,
        })
    }
}

/// The inbound half of a handshake.
#[derive(Debug)]
pub enum ResumeMatcher {
    LiteralToken(LiteralScan),
    DelimiterPair(DelimiterExtractor),
}

impl ResumeMatcher {
    /// Build the matcher for `rule` with a scan buffer of `capacity` bytes.
    pub fn from_rule(rule: &ResumeRule, capacity: usize) -> Self {
        match rule {
            ResumeRule::Literal(token) => ResumeMatcher::LiteralToken(LiteralScan::new(
                TokenMatcher::new(token.clone()),
                capacity,
            )),
            ResumeRule::Delimited { start, end } => ResumeMatcher::DelimiterPair(
                DelimiterExtractor::new(start.clone(), end.clone(), capacity),
            ),
        }
    }

    /// Feed one inbound read.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Extraction, CapacityExceeded> {
        match self {
            ResumeMatcher::LiteralToken(scan) => scan.feed(chunk),
            ResumeMatcher::DelimiterPair(extractor) => extractor.feed(chunk),
        }
    }

    /// Largest read that can be fed next.
    pub fn spare(&self) -> usize {
        match self {
            ResumeMatcher::LiteralToken(scan) => scan.buffer.spare(),
            ResumeMatcher::DelimiterPair(extractor) => extractor.spare(),
        }
    }

    /// Total inbound bytes dropped across all handshakes.
    pub fn discarded(&self) -> usize {
        match self {
            ResumeMatcher::LiteralToken(scan) => scan.discarded,
            ResumeMatcher::DelimiterPair(extractor) => extractor.removed(),
        }
    }

    /// Whether the matched span is sent back to the peer.
    pub fn echoes(&self) -> bool {
        matches!(self, ResumeMatcher::DelimiterPair(_))
    }

    /// Re-arm for the next suspension.
    pub fn reset(&mut self) {
        match self {
            ResumeMatcher::LiteralToken(scan) => scan.buffer.clear(),
            ResumeMatcher::DelimiterPair(extractor) => extractor.reset(),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResumeMatcher::LiteralToken(_) => "literal",
            ResumeMatcher::DelimiterPair(_) => "delimited",
        }
    }
}
