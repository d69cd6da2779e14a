//! Length-prefixed framing over a byte stream.
//!
//! Wire unit: a 4-byte big-endian unsigned length N followed by N bytes of
//! UTF-8 JSON. [`FrameBuffer`] reassembles frames from arbitrarily fragmented
//! reads; a frame is decoded atomically or not at all.

use crate::constants::MAX_FRAME_SIZE;
use crate::frame::Frame;
use crate::ProtocolError;

/// Encode a frame as length prefix + JSON payload.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let payload = frame.to_payload()?;
    let len = payload.len() as u32;

    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Per-connection receive buffer.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn pending_len(&self) -> Option<u32> {
        let head: [u8; 4] = self.buf.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(head))
    }

    /// True iff a complete, size-valid frame is buffered.
    pub fn has_complete_frame(&self) -> bool {
        match self.pending_len() {
            Some(len) if len <= MAX_FRAME_SIZE => self.buf.len() >= 4 + len as usize,
            _ => false,
        }
    }

    /// Pop the next frame off the buffer.
    ///
    /// `Ok(None)` means more bytes are needed. An oversized length prefix
    /// clears the whole buffer (the stream position is unrecoverable);
    /// a complete frame that fails to parse is drained so the connection can
    /// keep going.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(len) = self.pending_len() else {
            return Ok(None);
        };

        if len > MAX_FRAME_SIZE {
            self.buf.clear();
            return Err(ProtocolError::FrameTooLarge(len));
        }

        let total = 4 + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let result = Frame::from_payload(&self.buf[4..total]);
        self.buf.drain(..total);
        result.map(Some)
    }
}
