//! Conversion between wire bytes and typed values.
//!
//! Command parameters are flattened into a plain byte sequence; the protocol
//! itself carries no multi-byte integer encoding, so 16-bit offsets and the
//! like are supplied pre-split into MSB/LSB bytes by the caller. Response
//! bodies are decoded through [`FromResponse`], with one explicit impl per
//! supported target type.

/// Reserved parameter value meaning "report the current setting" instead of
/// assigning a new one.
pub const GET_MODIFIER: u8 = 0xFF;

/// A single command parameter, ready to be flattened onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A plain byte.
    U8(u8),
    /// A boolean, encoded as 0/1.
    Bool(bool),
    /// A nested byte sequence, emitted verbatim.
    Bytes(Vec<u8>),
}

impl From<u8> for ParamValue {
    fn from(value: u8) -> Self {
        ParamValue::U8(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Bytes(value)
    }
}

impl From<&[u8]> for ParamValue {
    fn from(value: &[u8]) -> Self {
        ParamValue::Bytes(value.to_vec())
    }
}

/// Flatten parameters into one contiguous byte sequence, preserving order.
pub fn encode_params(parts: &[ParamValue]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            ParamValue::U8(b) => out.push(*b),
            ParamValue::Bool(v) => out.push(u8::from(*v)),
            ParamValue::Bytes(bytes) => out.extend_from_slice(bytes),
        }
    }
    out
}

/// Types decodable from a response body.
///
/// Numeric targets accumulate up to `size_of::<T>()` little-endian bytes,
/// zero-extending when the body is shorter. A body longer than the target is
/// truncated, not an error.
pub trait FromResponse: Sized {
    fn from_response(body: &[u8]) -> Self;
}

macro_rules! impl_le_numeric {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromResponse for $ty {
                fn from_response(body: &[u8]) -> Self {
                    let take = body.len().min(std::mem::size_of::<$ty>());
                    let mut value: $ty = 0;
                    for (i, byte) in body[..take].iter().enumerate() {
                        value |= (*byte as $ty) << (8 * i);
                    }
                    value
                }
            }
        )*
    };
}

impl_le_numeric!(u8, u16, u32, u64);

impl FromResponse for bool {
    fn from_response(body: &[u8]) -> Self {
        body.first().is_some_and(|b| *b != 0)
    }
}

impl FromResponse for String {
    /// Each body byte is one character; trailing NUL and space padding is
    /// trimmed.
    fn from_response(body: &[u8]) -> Self {
        let text: String = body.iter().map(|b| *b as char).collect();
        text.trim_end_matches(['\0', ' ']).to_string()
    }
}

impl FromResponse for Vec<u8> {
    fn from_response(body: &[u8]) -> Self {
        body.to_vec()
    }
}

impl FromResponse for () {
    fn from_response(_body: &[u8]) -> Self {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_flatten_in_order() {
        let bytes = encode_params(&[
            ParamValue::U8(0x50),
            ParamValue::Bool(true),
            ParamValue::Bytes(vec![0x01, 0x02]),
            ParamValue::Bool(false),
        ]);
        assert_eq!(bytes, vec![0x50, 0x01, 0x01, 0x02, 0x00]);
    }

    #[test]
    fn empty_params_flatten_to_nothing() {
        assert!(encode_params(&[]).is_empty());
    }

    #[test]
    fn numeric_decode_is_little_endian() {
        assert_eq!(u16::from_response(&[0x34, 0x12]), 0x1234);
        assert_eq!(u32::from_response(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
    }

    #[test]
    fn short_body_zero_extends() {
        assert_eq!(u32::from_response(&[0x01]), 1);
        assert_eq!(u64::from_response(&[]), 0);
        assert_eq!(u16::from_response(&[0xFF]), 0x00FF);
    }

    #[test]
    fn long_body_truncates() {
        assert_eq!(u8::from_response(&[0x01, 0x02, 0x03]), 0x01);
        assert_eq!(u16::from_response(&[0x01, 0x02, 0x03]), 0x0201);
    }

    #[test]
    fn numeric_roundtrip_up_to_target_width() {
        // Re-encoding the decoded value reproduces the consumed prefix.
        let body = [0xDE, 0xAD, 0xBE, 0xEF];
        let value = u32::from_response(&body);
        assert_eq!(value.to_le_bytes(), body);

        let short = [0x2A];
        let value = u16::from_response(&short);
        assert_eq!(value.to_le_bytes()[0], short[0]);
    }

    #[test]
    fn bool_decode() {
        assert!(bool::from_response(&[1]));
        assert!(bool::from_response(&[0xFF]));
        assert!(!bool::from_response(&[0]));
        assert!(!bool::from_response(&[]));
    }

    #[test]
    fn string_trims_trailing_padding() {
        assert_eq!(
            String::from_response(b"SPD-RW\0\0\0\0"),
            "SPD-RW".to_string()
        );
        assert_eq!(String::from_response(b"name  "), "name".to_string());
        assert_eq!(String::from_response(b""), String::new());
    }

    #[test]
    fn bytes_pass_through_unchanged() {
        let body = [0x00, 0x10, 0xFF];
        assert_eq!(Vec::<u8>::from_response(&body), body.to_vec());
    }
}
