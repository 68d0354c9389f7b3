//! Sentinel-delimited framing.
//!
//! Every frame on the wire is a serialized payload followed by a single
//! `0x1E` (ASCII record separator) byte. JSON text never contains a raw
//! `0x1E`, so the delimiter cannot appear inside a payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = 0x1E;

/// Codec that splits a byte stream on [`FRAME_DELIMITER`].
///
/// Partial frames stay in the read buffer until their delimiter arrives.
/// Empty frames (two delimiters in a row) are skipped.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Bytes of the buffer already scanned without finding a delimiter.
    next_index: usize,
    max_length: usize,
}

impl FrameCodec {
    /// Create a codec with no frame size limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_length: usize::MAX,
        }
    }

    /// Create a codec that rejects frames longer than `max_length` bytes.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        loop {
            self.next_index = self.next_index.min(src.len());
            let offset = src[self.next_index..]
                .iter()
                .position(|b| *b == FRAME_DELIMITER);

            let Some(offset) = offset else {
                if src.len() > self.max_length {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("frame exceeds {} bytes without a delimiter", self.max_length),
                    ));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            let frame = src.split_to(end);
            src.advance(1);

            if frame.is_empty() {
                continue;
            }
            if frame.len() > self.max_length {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame of {} bytes exceeds {}", frame.len(), self.max_length),
                ));
            }
            return Ok(Some(frame.freeze()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!(bytes = buf.len(), "Dropping unterminated frame at end of stream");
                    buf.clear();
                    self.next_index = 0;
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), io::Error> {
        if payload.contains(&FRAME_DELIMITER) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload contains the frame delimiter",
            ));
        }
        dst.reserve(payload.len() + 1);
        dst.put(payload);
        dst.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}
