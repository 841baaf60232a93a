//! Reassembles newline-delimited JSON lines from arbitrarily split chunks.
//!
//! Decoding only happens when a chunk *ends* on `\n`; at that point the whole
//! buffer is a run of complete lines.  A chunk ending mid-line just grows the
//! buffer.  Whatever is still buffered when the stream ends is never yielded.

use crate::error::SyncError;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `FrameTooLarge` once more than `limit` bytes are buffered
    /// without a terminating newline.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Feeds one chunk.  Returns the completed lines of this frame cycle, or
    /// `None` when the chunk did not end on a line boundary.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<String>>, SyncError> {
        self.buf.extend_from_slice(chunk);

        if chunk.last() != Some(&b'\n') {
            if let Some(limit) = self.limit {
                if self.buf.len() > limit {
                    self.buf.clear();
                    return Err(SyncError::FrameTooLarge { limit });
                }
            }
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&self.buf);
        let mut lines: Vec<String> = text.split('\n').map(str::to_owned).collect();
        // trailing "" after the final separator
        lines.pop();
        self.buf.clear();
        Ok(Some(lines))
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
