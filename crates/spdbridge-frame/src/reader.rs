use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::codec::{decode_frame, Frame, ALERT_MARKER, RESPONSE_MARKER};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;
const READ_CHUNK_SIZE: usize = 64;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames.
/// Keeps its accumulation buffer across calls, so a read that fails with
/// `TimedOut`/`WouldBlock` can simply be retried without losing a partially
/// received frame.
///
/// Resynchronization: bytes that do not form a recognizable frame (an
/// unknown header, or a response with an impossible length) are discarded up
/// to the next frame marker and counted in [`framing_errors`].
///
/// [`framing_errors`]: FrameReader::framing_errors
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    framing_errors: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            framing_errors: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// A timed-out underlying read surfaces as `FrameError::Io` with kind
    /// `TimedOut`; buffered partial frames survive the error.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            loop {
                match decode_frame(&mut self.buf) {
                    Ok(Some(frame)) => return Ok(frame),
                    Ok(None) => break,
                    Err(FrameError::InvalidHeader(byte)) => {
                        warn!(byte = format_args!("0x{byte:02X}"), "resynchronizing");
                        self.discard_to_next_marker();
                    }
                    Err(FrameError::BodyTooLarge { size, max }) => {
                        // The marker itself is untrustworthy here.
                        warn!(size, max, "impossible frame length, resynchronizing");
                        self.discard_to_next_marker();
                    }
                    Err(err) => return Err(err),
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drop the leading byte and scan forward to the next frame marker.
    fn discard_to_next_marker(&mut self) {
        self.buf.advance(1);
        self.framing_errors += 1;
        while let Some(byte) = self.buf.first() {
            if *byte == ALERT_MARKER || *byte == RESPONSE_MARKER {
                break;
            }
            self.buf.advance(1);
            self.framing_errors += 1;
        }
    }

    /// Total bytes discarded while resynchronizing.
    pub fn framing_errors(&self) -> u64 {
        self.framing_errors
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_alert, encode_response};

    #[test]
    fn read_single_response() {
        let mut wire = BytesMut::new();
        encode_response(&[1, 2, 3], &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        match frame {
            Frame::Response { body, .. } => assert_eq!(body.as_ref(), &[1, 2, 3]),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn read_interleaved_alert_and_response() {
        let mut wire = BytesMut::new();
        encode_alert(b'!', &mut wire);
        encode_response(&[1], &mut wire).unwrap();
        encode_alert(b'+', &mut wire);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        assert_eq!(reader.read_frame().unwrap(), Frame::Alert { code: b'!' });
        assert!(!reader.read_frame().unwrap().is_alert());
        assert_eq!(reader.read_frame().unwrap(), Frame::Alert { code: b'+' });
    }

    #[test]
    fn byte_by_byte_delivery() {
        let mut wire = BytesMut::new();
        encode_response(&[0xAB, 0xCD], &mut wire).unwrap();

        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        });

        let frame = reader.read_frame().unwrap();
        assert!(frame.checksum_ok());
    }

    #[test]
    fn resync_discards_garbage_before_frame() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&[0x00, 0x13, 0x37]);
        encode_alert(b'!', &mut wire);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame, Frame::Alert { code: b'!' });
        assert_eq!(reader.framing_errors(), 3);
    }

    #[test]
    fn resync_after_impossible_length() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&[crate::codec::RESPONSE_MARKER, 200]);
        encode_response(&[7], &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        match frame {
            Frame::Response { body, .. } => assert_eq!(body.as_ref(), &[7]),
            other => panic!("expected response, got {other:?}"),
        }
        assert!(reader.framing_errors() > 0);
    }

    #[test]
    fn eof_is_connection_closed() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn eof_mid_frame_is_connection_closed() {
        let bytes = vec![crate::codec::RESPONSE_MARKER, 4, 0x01];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn timed_out_read_keeps_partial_frame() {
        let mut wire = BytesMut::new();
        encode_response(&[9, 9], &mut wire).unwrap();
        let bytes = wire.to_vec();

        // First two bytes, then a timeout, then the rest.
        let reader = SegmentedReader {
            segments: vec![bytes[..2].to_vec(), Vec::new(), bytes[2..].to_vec()],
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::TimedOut));

        // Retry completes the same frame.
        let frame = framed.read_frame().unwrap();
        assert!(frame.checksum_ok());
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_alert(b'/', &mut wire);

        let reader = InterruptedThenData {
            interrupted: false,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);

        assert_eq!(framed.read_frame().unwrap(), Frame::Alert { code: b'/' });
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Delivers one segment per call; an empty segment becomes `TimedOut`.
    struct SegmentedReader {
        segments: Vec<Vec<u8>>,
        pos: usize,
    }

    impl Read for SegmentedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.segments.len() {
                return Ok(0);
            }
            let segment = &self.segments[self.pos];
            self.pos += 1;
            if segment.is_empty() {
                return Err(std::io::Error::from(ErrorKind::TimedOut));
            }
            let n = segment.len().min(buf.len());
            buf[..n].copy_from_slice(&segment[..n]);
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
