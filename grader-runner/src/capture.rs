//! Output capture
//!
//! Accumulates a sandbox's combined output under a fixed memory bound.
//! Once the stream grows past the limit only the head and the tail are kept,
//! joined by an elision marker; bytes in the middle are dropped as they arrive.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// Marker placed between head and tail of truncated output
pub const DEFAULT_ELISION_MARKER: &str = "\n\n... [output truncated] ...\n\n";

/// Size limits for captured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Output up to this size is returned whole
    pub max_bytes: usize,

    /// Bytes kept from the start once truncated
    pub head_bytes: usize,

    /// Bytes kept from the end once truncated
    pub tail_bytes: usize,

    /// Text inserted where bytes were dropped
    pub marker: String,
}

impl CaptureLimits {
    pub fn new(max_bytes: usize, head_bytes: usize, tail_bytes: usize) -> Self {
        Self {
            max_bytes,
            head_bytes,
            tail_bytes,
            marker: DEFAULT_ELISION_MARKER.to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Largest output a capturer with these limits can return
    pub fn bound(&self) -> usize {
        self.max_bytes
            .max(self.head_bytes + self.marker.len() + self.tail_bytes)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_bytes == 0 {
            anyhow::bail!("max_bytes must be greater than 0");
        }
        if self.head_bytes + self.tail_bytes > self.max_bytes {
            anyhow::bail!(
                "head_bytes ({}) + tail_bytes ({}) must not exceed max_bytes ({})",
                self.head_bytes,
                self.tail_bytes,
                self.max_bytes
            );
        }
        Ok(())
    }
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self::new(1024 * 1024, 512 * 1024, 512 * 1024)
    }
}

/// Final captured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub text: String,
    pub truncated: bool,
    pub total_bytes: u64,
}

/// Bounded accumulator with head/tail retention
///
/// The result depends only on the concatenated bytes written, never on how
/// they were split into chunks.
#[derive(Debug)]
pub struct OutputCapturer {
    limits: CaptureLimits,
    /// Whole stream until truncation, then only the head
    buf: Vec<u8>,
    tail: VecDeque<u8>,
    total: u64,
    truncated: bool,
}

impl OutputCapturer {
    pub fn new(limits: CaptureLimits) -> Self {
        Self {
            limits,
            buf: Vec::new(),
            tail: VecDeque::new(),
            total: 0,
            truncated: false,
        }
    }

    /// Appends a chunk of output
    pub fn write(&mut self, mut chunk: &[u8]) {
        self.total += chunk.len() as u64;

        if !self.truncated {
            if self.buf.len() + chunk.len() <= self.limits.max_bytes {
                self.buf.extend_from_slice(chunk);
                return;
            }

            self.truncated = true;
            let head = self.limits.head_bytes;
            let spill = self.buf.split_off(head.min(self.buf.len()));

            if self.buf.len() < head {
                let take = (head - self.buf.len()).min(chunk.len());
                self.buf.extend_from_slice(&chunk[..take]);
                chunk = &chunk[take..];
            }
            self.buf.shrink_to_fit();
            self.push_tail(&spill);
        }

        self.push_tail(chunk);
    }

    fn push_tail(&mut self, bytes: &[u8]) {
        let cap = self.limits.tail_bytes;
        if cap == 0 || bytes.is_empty() {
            return;
        }
        if bytes.len() >= cap {
            self.tail.clear();
            self.tail.extend(&bytes[bytes.len() - cap..]);
            return;
        }
        let excess = (self.tail.len() + bytes.len()).saturating_sub(cap);
        self.tail.drain(..excess);
        self.tail.extend(bytes);
    }

    /// Number of bytes dropped from the middle so far
    pub fn omitted_bytes(&self) -> u64 {
        if !self.truncated {
            return 0;
        }
        self.total - (self.buf.len() + self.tail.len()) as u64
    }

    /// Consumes the capturer and renders the retained output
    pub fn finish(self) -> Captured {
        let bytes = if self.truncated {
            let mut out =
                Vec::with_capacity(self.buf.len() + self.limits.marker.len() + self.tail.len());
            out.extend_from_slice(&self.buf);
            out.extend_from_slice(self.limits.marker.as_bytes());
            out.extend(self.tail.iter());
            out
        } else {
            self.buf
        };

        Captured {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            truncated: self.truncated,
            total_bytes: self.total,
        }
    }
}

impl AsyncWrite for OutputCapturer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.get_mut().write(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
