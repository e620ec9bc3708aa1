//! Wire decoding: newline-delimited JSON frames from raw network reads.

use thiserror::Error;
use vizier_agent::frames::ColumnFrame;

/// Decoding failures. A malformed complete record is an error, never
/// silently dropped; an incomplete record is simply buffered.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid frame record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("frame record is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Push decoder for the frame wire format: one JSON object per frame, one
/// frame per line, over a single unbroken response body.
///
/// Frames may arrive split across arbitrary network reads; bytes are
/// buffered until a full record boundary (newline) is seen. Buffering in
/// bytes rather than text keeps multi-byte characters split across reads
/// intact.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ColumnFrame>, DecodeError> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let record: Vec<u8> = self.buf.drain(..=newline).collect();
            let mut line = &record[..record.len() - 1];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                continue;
            }
            let text = std::str::from_utf8(line)?;
            frames.push(serde_json::from_str(text)?);
        }
        Ok(frames)
    }

    /// Whether any bytes remain buffered without a record boundary.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
