use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Marker byte opening an alert frame: `'@'`.
pub const ALERT_MARKER: u8 = 0x40;

/// Marker byte opening a response frame: `'&'`.
pub const RESPONSE_MARKER: u8 = 0x26;

/// Maximum response body length in bytes.
pub const MAX_BODY: usize = 32;

/// Smallest complete frame on the wire (an alert).
pub const MIN_FRAME_SIZE: usize = 2;

/// A frame received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Unsolicited 2-byte notification.
    Alert {
        /// Alert code byte.
        code: u8,
    },
    /// Solicited, length-prefixed, checksummed reply to a command.
    Response {
        /// Response body, 0..=32 bytes.
        body: Bytes,
        /// Checksum byte as received. Validated by the caller, not here; a
        /// mismatching frame must not be treated as a value.
        checksum: u8,
    },
}

impl Frame {
    /// Whether this frame is an alert.
    pub fn is_alert(&self) -> bool {
        matches!(self, Frame::Alert { .. })
    }

    /// For responses, whether the received checksum matches the body.
    /// Alerts carry no checksum and always pass.
    pub fn checksum_ok(&self) -> bool {
        match self {
            Frame::Alert { .. } => true,
            Frame::Response { body, checksum } => validate_checksum(body, *checksum),
        }
    }
}

/// Additive checksum: sum of all body bytes truncated to 8 bits.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Whether `received` is the correct checksum for `body`.
pub fn validate_checksum(body: &[u8], received: u8) -> bool {
    checksum(body) == received
}

/// Encode an alert frame into `dst`.
pub fn encode_alert(code: u8, dst: &mut BytesMut) {
    dst.reserve(MIN_FRAME_SIZE);
    dst.put_u8(ALERT_MARKER);
    dst.put_u8(code);
}

/// Encode a response frame (with a correct checksum) into `dst`.
pub fn encode_response(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > MAX_BODY {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: MAX_BODY,
        });
    }
    dst.reserve(3 + body.len());
    dst.put_u8(RESPONSE_MARKER);
    dst.put_u8(body.len() as u8);
    dst.put_slice(body);
    dst.put_u8(checksum(body));
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On
/// `InvalidHeader`/`BodyTooLarge` nothing is consumed; the caller decides the
/// resynchronization policy.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }

    match src[0] {
        ALERT_MARKER => {
            if src.len() < MIN_FRAME_SIZE {
                return Ok(None); // Need more data
            }
            let code = src[1];
            src.advance(MIN_FRAME_SIZE);
            Ok(Some(Frame::Alert { code }))
        }
        RESPONSE_MARKER => {
            if src.len() < 2 {
                return Ok(None);
            }
            let len = src[1] as usize;
            if len > MAX_BODY {
                return Err(FrameError::BodyTooLarge {
                    size: len,
                    max: MAX_BODY,
                });
            }
            let total = 3 + len;
            if src.len() < total {
                return Ok(None); // Need more data
            }
            src.advance(2);
            let body = src.split_to(len).freeze();
            let received = src[0];
            src.advance(1);
            Ok(Some(Frame::Response {
                body,
                checksum: received,
            }))
        }
        other => Err(FrameError::InvalidHeader(other)),
    }
}
