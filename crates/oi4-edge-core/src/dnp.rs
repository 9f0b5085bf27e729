//! DNP encoding for identifier parts.
//!
//! DNP is URL percent-encoding with the escape marker `,` instead of `%`, so
//! that encoded identifiers are DIN SPEC 91406 compliant and safe to use as
//! MQTT topic segments:
//!
//! - Unreserved characters `A-Z a-z 0-9 - _ . ~` pass through unchanged
//! - Every other byte becomes `,XX` (two uppercase hex digits)
//! - Multi-byte UTF-8 characters are escaped byte by byte

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Escape marker used in place of `%`.
pub const ESCAPE_MARKER: char = ',';

/// Bytes that must be escaped: everything except the unreserved set.
const DNP_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Encode a string using DNP escaping.
///
/// # Examples
///
/// ```
/// use oi4_edge_core::dnp::encode;
///
/// assert_eq!(encode("123.456/3&8"), "123.456,2F3,268");
/// assert_eq!(encode("plain-Text_1.0~"), "plain-Text_1.0~");
/// ```
#[must_use]
pub fn encode(input: &str) -> String {
    // The set escapes both `%` and `,`, so after encoding every `%` in the
    // output is a marker and can be swapped one to one.
    utf8_percent_encode(input, DNP_ESCAPE)
        .to_string()
        .replace('%', ",")
}

/// Decode a DNP-encoded string.
///
/// # Errors
///
/// Returns [`EncodingError::InvalidEscape`] with the offending (at most
/// three character) substring if a marker is not followed by two hex digits,
/// and [`EncodingError::Utf8Decode`] if the decoded bytes are not UTF-8.
///
/// # Examples
///
/// ```
/// use oi4_edge_core::dnp::decode;
///
/// assert_eq!(decode("FBC,23123").unwrap(), "FBC#123");
/// assert!(decode("bad,2").is_err());
/// ```
pub fn decode(input: &str) -> Result<String, EncodingError> {
    let bytes = input.as_bytes();
    let mut markers = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b',' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                // `i` sits on an ASCII marker, so slicing there is safe
                return Err(EncodingError::InvalidEscape(input[i..].chars().take(3).collect()));
            }
            markers += 1;
            i += 3;
        } else {
            i += 1;
        }
    }

    if markers == 0 {
        return Ok(input.to_string());
    }

    // Rewrite into regular percent-encoding: literal `%` must survive.
    let mut percent = String::with_capacity(input.len() + 2 * markers);
    for c in input.chars() {
        match c {
            ',' => percent.push('%'),
            '%' => percent.push_str("%25"),
            other => percent.push(other),
        }
    }

    percent_decode_str(&percent)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| EncodingError::Utf8Decode(e.to_string()))
}

/// Errors that can occur during DNP decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Escape marker not followed by two hex digits
    #[error("invalid DNP escape \"{0}\"")]
    InvalidEscape(String),
    /// Decoded bytes are not valid UTF-8
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(String),
}
