//! Incremental literal token matching.
//!
//! The matcher is stateless: every call scans the whole unreleased buffer,
//! so a token split across any number of chunk boundaries is found as soon as
//! its last byte arrives. The caller owns the buffer and releases the prefix
//! the matcher reports as safe, which keeps the retained partial match
//! shorter than the token.

use bytes::Bytes;

/// Outcome of scanning a buffer for the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// No byte in the buffer can start the token.
    Searching,
    /// The buffer tail from `offset` is a proper prefix of the token.
    PartialMatch { offset: usize, len: usize },
    /// The token occurs at `offset`; `len` is the token length.
    FullMatch { offset: usize, len: usize },
}

impl MatchState {
    /// Number of leading bytes that are not part of any candidate match.
    pub fn releasable(&self, buffered: usize) -> usize {
        match *self {
            MatchState::Searching => buffered,
            MatchState::PartialMatch { offset, .. } | MatchState::FullMatch { offset, .. } => {
                offset
            }
        }
    }
}

/// Matcher for a single literal token.
///
/// An empty token never matches.
#[derive(Debug, Clone)]
pub struct TokenMatcher {
    token: Bytes,
}

impl TokenMatcher {
    /// Create a matcher for `token`.
    pub fn new(token: impl Into<Bytes>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Token length in bytes.
    pub fn len(&self) -> usize {
        self.token.len()
    }

    /// Check if the matcher is disabled.
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// Scan `buffer` for the leftmost full or partial occurrence of the token.
    ///
    /// Each offset is compared against the token truncated to the bytes
    /// remaining; the first offset that agrees is the candidate. It is a full
    /// match if the whole token fit, partial otherwise.
    pub fn scan(&self, buffer: &[u8]) -> MatchState {
        if self.token.is_empty() {
            return MatchState::Searching;
        }

        for offset in 0..buffer.len() {
            let rest = &buffer[offset..];
            let n = rest.len().min(self.token.len());
            if rest[..n] != self.token[..n] {
                continue;
            }
            return if n == self.token.len() {
                MatchState::FullMatch { offset, len: n }
            } else {
                MatchState::PartialMatch { offset, len: n }
            };
        }

        MatchState::Searching
    }
}
