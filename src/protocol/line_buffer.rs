//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. The device terminates every
//! reply with a line feed; anything after the last `\n` is kept until the
//! next read completes it.
//!
//! # Example
//!
//! ```
//! use orei_control::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! let lines: Vec<_> = buffer.push(b"PWR1\r\nOS").collect();
//! assert_eq!(lines.len(), 1);
//!
//! let lines: Vec<_> = buffer.push(b"D0\n").collect();
//! assert_eq!(&lines[0][..], b"OSD0");
//! ```

use bytes::{Bytes, BytesMut};

/// Line delimiter used by the device.
pub const LINE_FEED: u8 = b'\n';

/// Initial buffer capacity. Replies are a handful of bytes.
const DEFAULT_CAPACITY: usize = 1024;

/// Buffer for accumulating incoming bytes and extracting complete lines.
///
/// Carriage returns are left in place; the classifier trims them.
#[derive(Debug)]
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Bytes already scanned for a delimiter without finding one.
    scanned: usize,
    /// Optional bound on line length.
    max_line_length: Option<usize>,
    /// Set while skipping the remainder of an overlong line.
    discarding: bool,
}

impl LineBuffer {
    /// Create a new, unbounded line buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            scanned: 0,
            max_line_length: None,
            discarding: false,
        }
    }

    /// Create a line buffer that drops lines longer than `max` bytes.
    ///
    /// The overlong bytes are discarded as soon as the bound is crossed and
    /// framing resumes after the next line feed.
    pub fn with_max_line_length(max: usize) -> Self {
        Self {
            max_line_length: Some(max),
            ..Self::new()
        }
    }

    /// Push data into the buffer and iterate the complete lines.
    ///
    /// Lines are extracted lazily. Lines left unread when the iterator is
    /// dropped stay buffered and come out of the next `push`.
    pub fn push(&mut self, data: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(data);
        Lines { buffer: self }
    }

    /// Extract the next complete, non-empty line, if any.
    pub fn next_line(&mut self) -> Option<Bytes> {
        loop {
            let Some(offset) = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == LINE_FEED)
            else {
                self.scanned = self.buffer.len();
                self.enforce_bound();
                return None;
            };

            let end = self.scanned + offset;
            let mut line = self.buffer.split_to(end + 1);
            line.truncate(end);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.is_empty() {
                continue;
            }
            if self.max_line_length.is_some_and(|max| line.len() > max) {
                tracing::warn!("Discarding {}-byte line", line.len());
                continue;
            }
            return Some(line.freeze());
        }
    }

    fn enforce_bound(&mut self) {
        let Some(max) = self.max_line_length else {
            return;
        };
        if self.buffer.len() > max {
            tracing::warn!(
                "Discarding {} bytes of unterminated input (limit {})",
                self.buffer.len(),
                max
            );
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the complete lines of a [`LineBuffer`].
pub struct Lines<'a> {
    buffer: &'a mut LineBuffer,
}

impl Iterator for Lines<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.buffer.next_line()
    }
}
