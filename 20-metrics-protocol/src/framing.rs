//! Request framing for one connection.
//!
//! Bytes are accumulated until the buffer ends with `\n`. At that point the
//! buffer is split into lines, blank lines are dropped, and exactly one line
//! must remain. More than one line in a single read cycle is rejected rather
//! than queued. The buffer is cleared after every resolved request, whatever
//! the outcome.

use std::str;

use thiserror::Error;

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

const TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("request contained no command")]
    Blank,
    #[error("{0} requests arrived in one read; pipelining is not supported")]
    Pipelined(usize),
    #[error("request is not valid UTF-8")]
    InvalidUtf8,
    #[error("request exceeded {0} bytes without a line terminator")]
    TooLong(usize),
}

/// Result of feeding a chunk into a [`RequestBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// No terminator yet; wait for more bytes.
    Pending,
    Request(String),
    Rejected(FrameError),
}

#[derive(Debug)]
pub struct RequestBuffer {
    buffer: Vec<u8>,
    max_len: usize,
    /// Set after an oversized request; input is dropped up to the next `\n`.
    discarding: bool,
}

impl RequestBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, mut chunk: &[u8]) -> Frame {
        if self.discarding {
            match chunk.iter().position(|&byte| byte == TERMINATOR) {
                Some(end) => {
                    self.discarding = false;
                    chunk = &chunk[end + 1..];
                    if chunk.is_empty() {
                        return Frame::Pending;
                    }
                }
                None => return Frame::Pending,
            }
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.last() != Some(&TERMINATOR) {
            return self.check_partial();
        }

        let bytes = std::mem::take(&mut self.buffer);
        if bytes.len() > self.max_len {
            return Frame::Rejected(FrameError::TooLong(self.max_len));
        }

        let Ok(text) = String::from_utf8(bytes) else {
            return Frame::Rejected(FrameError::InvalidUtf8);
        };

        let mut lines = text.split('\n').filter(|line| !line.is_empty());
        match (lines.next(), lines.next()) {
            (Some(line), None) => Frame::Request(line.to_string()),
            (None, _) => Frame::Rejected(FrameError::Blank),
            (Some(_), Some(_)) => Frame::Rejected(FrameError::Pipelined(2 + lines.count())),
        }
    }

    /// Rejects an unterminated buffer early when it can never become a valid
    /// request. A multi-byte character cut off at the end is not an error yet.
    fn check_partial(&mut self) -> Frame {
        if let Err(err) = str::from_utf8(&self.buffer) {
            if err.error_len().is_some() {
                self.buffer.clear();
                return Frame::Rejected(FrameError::InvalidUtf8);
            }
        }

        if self.buffer.len() > self.max_len {
            self.buffer.clear();
            self.discarding = true;
            return Frame::Rejected(FrameError::TooLong(self.max_len));
        }

        Frame::Pending
    }
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_BYTES)
    }
}
