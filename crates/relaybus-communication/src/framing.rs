//! Newline framing
//!
//! The wire is a stream of UTF-8 lines, one JSON envelope per line. A
//! socket read may hold part of a frame or several frames, so each
//! connection keeps a [`FrameDecoder`] that buffers bytes until a `\n`
//! arrives.

use relaybus_core::{CodecError, Envelope};

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'\n';

/// Default upper bound for one frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Encode an envelope as one wire frame, terminator included
pub fn encode_frame(envelope: &Envelope) -> Result<String, CodecError> {
    let mut line = envelope.encode()?;
    line.push(FRAME_DELIMITER as char);
    Ok(line)
}

/// Incremental splitter for newline-terminated frames
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a terminator
    scanned: usize,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting frames longer than `max_frame_bytes`
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame_bytes: max_frame_bytes.max(1),
        }
    }

    /// Bytes held for an incomplete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append bytes and return every frame they complete
    ///
    /// Frames come back without the terminator; a trailing `\r` is
    /// stripped and blank lines are skipped. A frame that is not UTF-8 is
    /// dropped with a warning. An error means the peer exceeded the frame
    /// limit and the connection should be closed.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, CodecError> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        {
            let end = search_from + offset;
            let mut raw = &self.buffer[start..end];
            if let Some(stripped) = raw.strip_suffix(b"\r") {
                raw = stripped;
            }
            start = end + 1;
            search_from = start;

            if raw.len() > self.max_frame_bytes {
                return Err(CodecError::FrameTooLarge {
                    limit: self.max_frame_bytes,
                    buffered: raw.len(),
                });
            }
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match std::str::from_utf8(raw) {
                Ok(line) => frames.push(line.to_string()),
                Err(_) => {
                    let err = CodecError::InvalidUtf8 { len: raw.len() };
                    tracing::warn!("Dropping frame: {}", err);
                }
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_frame_bytes {
            return Err(CodecError::FrameTooLarge {
                limit: self.max_frame_bytes,
                buffered: self.buffer.len(),
            });
        }

        Ok(frames)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
