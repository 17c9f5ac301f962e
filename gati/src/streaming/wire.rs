//! Length-prefixed JSON framing
//!
//! ```text
//! ┌──────────────────┬─────────────────────┐
//! │ Length (4 bytes) │ JSON payload        │
//! │ Big-endian u32   │ (≤ max frame bytes) │
//! └──────────────────┴─────────────────────┘
//! ```
//!
//! Used for commands and acks on TCP and for status datagrams on UDP.
//! An oversized length closes the connection; a payload that fails to
//! parse is answered with a rejection and the connection stays open.

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

pub const LEN_PREFIX: usize = 4;

/// Serialize `message` into one frame
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Serialization(format!("{} byte payload", payload.len())))?;
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    writer.write_all(&encode_frame(message)?)?;
    writer.flush()?;
    Ok(())
}

/// Reassembles frames across short reads and read timeouts
pub struct FrameReader {
    buffer: Vec<u8>,
    max_frame: usize,
}

impl FrameReader {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_frame,
        }
    }

    /// Next complete payload. `Ok(None)` when the read timed out first;
    /// partial bytes are kept for the next call.
    pub fn read_frame<R: Read>(&mut self, reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(frame) = self.next_buffered()? {
                return Ok(Some(frame));
            }
            match reader.read(&mut chunk) {
                Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn next_buffered(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(&[a, b, c, d]) = self.buffer.get(..LEN_PREFIX) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([a, b, c, d]) as usize;
        if len > self.max_frame {
            return Err(Error::Serialization(format!(
                "frame of {} bytes exceeds {} byte limit",
                len, self.max_frame
            )));
        }
        if self.buffer.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let frame = self.buffer[LEN_PREFIX..LEN_PREFIX + len].to_vec();
        self.buffer.drain(..LEN_PREFIX + len);
        Ok(Some(frame))
    }
}
