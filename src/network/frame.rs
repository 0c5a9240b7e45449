//! Frames as handed from a subscriber to the session

use std::time::Instant;

use bytes::Bytes;

/// How a frame's payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// Tightly packed 8-bit BGRA rows
    RawBgra,
    /// A complete encoded image (PNG, JPEG, ...)
    Encoded,
}

/// Video frame received from a pipe channel.
#[derive(Debug, Clone)]
pub struct PipeFrame {
    /// Publisher-assigned frame id, increasing per channel.
    pub id: i64,
    /// Frame width in pixels (0 when only known after decoding).
    pub width: u32,
    /// Frame height in pixels (0 when only known after decoding).
    pub height: u32,
    /// Payload bytes, shared with the receiver.
    pub data: Bytes,
    pub encoding: FrameEncoding,
    /// When this frame was received (for latency tracking).
    pub received_at: Instant,
}

impl PipeFrame {
    /// A raw BGRA frame received now.
    pub fn raw(id: i64, width: u32, height: u32, data: Bytes) -> Self {
        Self {
            id,
            width,
            height,
            data,
            encoding: FrameEncoding::RawBgra,
            received_at: Instant::now(),
        }
    }

    /// An encoded image frame received now.
    pub fn encoded(id: i64, data: Bytes) -> Self {
        Self {
            id,
            width: 0,
            height: 0,
            data,
            encoding: FrameEncoding::Encoded,
            received_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clone_shares_payload() {
        let frame = PipeFrame::raw(7, 1, 1, Bytes::from(vec![1, 2, 3, 4]));
        let cloned = frame.clone();
        assert_eq!(cloned.id, 7);
        assert_eq!(cloned.encoding, FrameEncoding::RawBgra);
        assert_eq!(cloned.data.as_ptr(), frame.data.as_ptr());
    }
}
