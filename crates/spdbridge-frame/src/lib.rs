//! Checksummed wire frames and value codec for the SPD device protocol.
//!
//! The device speaks two frame kinds over the serial link:
//! - Alert: a 1-byte marker (`@`) plus a 1-byte code — unsolicited
//! - Response: a 1-byte marker (`&`), a length byte (max 32), the body, and
//!   an additive checksum — solicited reply to a command
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod value;

pub use codec::{
    checksum, decode_frame, encode_alert, encode_response, validate_checksum, Frame, ALERT_MARKER,
    MAX_BODY, MIN_FRAME_SIZE, RESPONSE_MARKER,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use value::{encode_params, FromResponse, ParamValue, GET_MODIFIER};
