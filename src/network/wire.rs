//! Framing for pipe channels
//!
//! Every frame is a fixed 32-byte little-endian header followed by its payload:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "PIPE"
//!      4     2  version (1)
//!      6     2  encoding (0 = raw BGRA, 1 = encoded image)
//!      8     8  frame id (i64)
//!     16     4  width
//!     20     4  height
//!     24     4  payload length
//!     28     4  reserved (0)
//! ```

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{FrameEncoding, PipeFrame};

pub const MAGIC: [u8; 4] = *b"PIPE";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;

/// Default cap on a single payload: one 8K BGRA frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 7680 * 4320 * 4;

const ENCODING_RAW: u16 = 0;
const ENCODING_ENCODED: u16 = 1;

/// Errors from reading or writing framed data
#[derive(Debug, Error)]
pub enum WireError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown frame encoding {0}")]
    UnknownEncoding(u16),
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },
    /// Header fields disagree with each other or with the payload
    #[error("inconsistent frame: {0}")]
    Inconsistent(String),
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WireError {
    /// Whether the stream is still aligned on a frame boundary after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WireError::Inconsistent(_))
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub encoding: FrameEncoding,
    pub id: i64,
    pub width: u32,
    pub height: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::Inconsistent(format!(
                "header is {} bytes, expected {}",
                buf.len(),
                HEADER_LEN
            )));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic));
        }

        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let encoding = match buf.get_u16_le() {
            ENCODING_RAW => FrameEncoding::RawBgra,
            ENCODING_ENCODED => FrameEncoding::Encoded,
            other => return Err(WireError::UnknownEncoding(other)),
        };

        let id = buf.get_i64_le();
        let width = buf.get_u32_le();
        let height = buf.get_u32_le();
        let payload_len = buf.get_u32_le();
        // reserved
        buf.advance(4);

        Ok(Self {
            encoding,
            id,
            width,
            height,
            payload_len,
        })
    }

    pub fn write_to(&self, out: &mut BytesMut) {
        out.reserve(HEADER_LEN);
        out.put_slice(&MAGIC);
        out.put_u16_le(VERSION);
        out.put_u16_le(match self.encoding {
            FrameEncoding::RawBgra => ENCODING_RAW,
            FrameEncoding::Encoded => ENCODING_ENCODED,
        });
        out.put_i64_le(self.id);
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u32_le(self.payload_len);
        out.put_u32_le(0);
    }

    /// Check the payload length against the frame shape.
    fn validate(&self) -> Result<(), WireError> {
        match self.encoding {
            FrameEncoding::RawBgra => {
                let expected = self.width as u64 * self.height as u64 * 4;
                if self.width == 0 || self.height == 0 || self.payload_len as u64 != expected {
                    return Err(WireError::Inconsistent(format!(
                        "raw {}x{} frame carries {} bytes, expected {}",
                        self.width, self.height, self.payload_len, expected
                    )));
                }
            }
            FrameEncoding::Encoded => {
                if self.payload_len == 0 {
                    return Err(WireError::Inconsistent("empty encoded frame".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Serialize one frame, header and payload, into a single buffer.
pub fn encode_frame(frame: &PipeFrame) -> Result<Bytes, WireError> {
    let payload_len = u32::try_from(frame.data.len()).map_err(|_| WireError::Oversized {
        len: frame.data.len(),
        max: u32::MAX as usize,
    })?;
    let header = FrameHeader {
        encoding: frame.encoding,
        id: frame.id,
        width: frame.width,
        height: frame.height,
        payload_len,
    };
    let mut out = BytesMut::with_capacity(HEADER_LEN + frame.data.len());
    header.write_to(&mut out);
    out.put_slice(&frame.data);
    Ok(out.freeze())
}

/// Write one frame to `writer`.
pub fn write_frame<W: Write>(writer: &mut W, frame: &PipeFrame) -> Result<(), WireError> {
    writer.write_all(&encode_frame(frame)?)?;
    Ok(())
}

/// Reads frames from a blocking stream.
///
/// Read timeouts on the underlying stream are absorbed: a partially read
/// frame is kept and the read resumes while `keep_going` returns true.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Read the next frame. Returns `Ok(None)` when `keep_going` asks to stop.
    ///
    /// [`WireError::Inconsistent`] frames have been fully consumed, so the
    /// reader can be used again; any other error leaves the stream unusable.
    pub fn read_frame(
        &mut self,
        keep_going: &dyn Fn() -> bool,
    ) -> Result<Option<PipeFrame>, WireError> {
        let mut header_buf = [0u8; HEADER_LEN];
        if !self.fill(&mut header_buf, keep_going)? {
            return Ok(None);
        }
        let header = FrameHeader::parse(&header_buf)?;

        let len = header.payload_len as usize;
        if len > self.max_frame_bytes {
            return Err(WireError::Oversized {
                len,
                max: self.max_frame_bytes,
            });
        }

        let mut payload = BytesMut::zeroed(len);
        if !self.fill(&mut payload, keep_going)? {
            return Ok(None);
        }

        header.validate()?;

        Ok(Some(PipeFrame {
            id: header.id,
            width: header.width,
            height: header.height,
            data: payload.freeze(),
            encoding: header.encoding,
            received_at: std::time::Instant::now(),
        }))
    }

    fn fill(&mut self, buf: &mut [u8], keep_going: &dyn Fn() -> bool) -> Result<bool, WireError> {
        let mut filled = 0;
        while filled < buf.len() {
            if !keep_going() {
                return Ok(false);
            }
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(WireError::Closed),
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}
