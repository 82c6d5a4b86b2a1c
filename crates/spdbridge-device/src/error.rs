use std::time::Duration;

use crate::command::Opcode;

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Link-level error.
    #[error("transport error: {0}")]
    Transport(#[from] spdbridge_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] spdbridge_frame::FrameError),

    /// A command was issued while the device is disconnected.
    #[error("device not connected")]
    NotConnected,

    /// No response frame arrived within the configured window.
    #[error("command {opcode:?} timed out after {timeout:?}")]
    Timeout { opcode: Opcode, timeout: Duration },

    /// The delivered frame was not a response.
    #[error("command {opcode:?} was answered by a non-response frame")]
    UnexpectedFrame { opcode: Opcode },

    /// The response body failed its additive checksum.
    #[error(
        "checksum mismatch for {opcode:?} (expected 0x{expected:02X}, received 0x{received:02X})"
    )]
    ChecksumMismatch {
        opcode: Opcode,
        expected: u8,
        received: u8,
    },

    /// Readiness wait or the Test command failed during connect.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
