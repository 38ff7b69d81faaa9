//! Plaintext framing for the ESPHome native API.
//!
//! Each frame on the wire is `0x00` · `varint(payload length)` ·
//! `varint(message type)` · payload. A byte stream that does not start with
//! the preamble is desynchronized: the decoder discards one byte and tries
//! again, and gives up after two consecutive failed resyncs (the connection
//! is then closed by the caller).

use crate::wire::{self, WireError};

/// Upper bound on a sane payload; anything larger is treated as a framing
/// error rather than an allocation request.
const MAX_PAYLOAD: u64 = 1024 * 1024;

const PREAMBLE: u8 = 0x00;

/// One decoded message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(msg_type: u32, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Encode the frame for the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 6);
        buf.push(PREAMBLE);
        wire::put_varint(&mut buf, self.payload.len() as u64);
        wire::put_varint(&mut buf, u64::from(self.msg_type));
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Raised when the decoder cannot resynchronize onto a frame boundary.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("could not resynchronize to frame boundary after {0} attempts")]
pub struct DesyncError(pub u32);

/// Incremental frame decoder over a byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    resync_failures: u32,
}

impl FrameDecoder {
    const MAX_RESYNC: u32 = 2;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered and not yet consumed by a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed; buffered input is not
    /// consumed in that case.
    ///
    /// # Errors
    ///
    /// Returns [`DesyncError`] after two consecutive failed resync
    /// attempts; the caller must close the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DesyncError> {
        loop {
            if self.buf.is_empty() {
                return Ok(None);
            }

            match Self::parse(&self.buf) {
                Ok(Some((frame, consumed))) => {
                    self.buf.drain(..consumed);
                    self.resync_failures = 0;
                    return Ok(Some(frame));
                }
                Ok(None) => return Ok(None),
                Err(_) => {
                    // Drop a single byte and try to lock on again.
                    self.buf.remove(0);
                    self.resync_failures += 1;
                    if self.resync_failures > Self::MAX_RESYNC {
                        return Err(DesyncError(self.resync_failures));
                    }
                }
            }
        }
    }

    /// Attempt to parse one frame at the head of `buf`. `Ok(None)` means
    /// the data so far is a valid prefix.
    fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
        if buf[0] != PREAMBLE {
            return Err(WireError::Truncated);
        }

        let mut pos = 1;
        let len = match wire::read_varint(buf, &mut pos) {
            Ok(len) => len,
            Err(WireError::Truncated) => return Ok(None),
            Err(err) => return Err(err),
        };
        if len > MAX_PAYLOAD {
            return Err(WireError::VarintOverflow);
        }
        let msg_type = match wire::read_varint(buf, &mut pos) {
            Ok(value) => value,
            Err(WireError::Truncated) => return Ok(None),
            Err(err) => return Err(err),
        };

        let len = len as usize;
        let Some(payload) = buf.get(pos..pos + len) else {
            return Ok(None);
        };

        #[allow(clippy::cast_possible_truncation)]
        let frame = Frame::new(msg_type as u32, payload.to_vec());
        Ok(Some((frame, pos + len)))
    }
}
