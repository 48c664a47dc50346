//! Transfer encodings used when composing a message.
//!
//! Base64 (RFC 2045 §6.8) is the transcoder for attachment bodies and SASL
//! credentials. RFC 2047 encoded-words cover non-ASCII header values.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Maximum encoded line length for base64 bodies (RFC 2045 §6.8).
pub const BASE64_LINE_LENGTH: usize = 76;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// Whitespace (including the CRLF inserted by line wrapping) is ignored.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes data as Base64 wrapped at `width` columns.
///
/// Lines are separated by CRLF; there is no trailing line break.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8], width: usize) -> String {
    let encoded = encode_base64(data);
    if width == 0 || encoded.len() <= width {
        return encoded;
    }

    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / width * 2);
    // Base64 output is pure ASCII, so byte chunks are valid str boundaries.
    for (i, chunk) in encoded.as_bytes().chunks(width).enumerate() {
        if i > 0 {
            wrapped.push_str("\r\n");
        }
        wrapped.push_str(&String::from_utf8_lossy(chunk));
    }
    wrapped
}

/// Encodes a header value using RFC 2047 if needed.
///
/// Format: `=?charset?B?encoded-text?=`
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !text.contains("=?") {
        return text.to_string();
    }

    let encoded = encode_base64(text.as_bytes());
    format!("=?{charset}?B?{encoded}?=")
}

/// Rewrites bare `\n` and bare `\r` as CRLF.
#[must_use]
pub fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut iter = data.iter().peekable();

    while let Some(&byte) = iter.next() {
        match byte {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if iter.peek() == Some(&&b'\n') {
                    iter.next();
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            _ => out.push(byte),
        }
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_base64_wrapped_line_length() {
        let data = vec![0xAB_u8; 300];
        let wrapped = encode_base64_wrapped(&data, BASE64_LINE_LENGTH);

        let lines: Vec<&str> = wrapped.split("\r\n").collect();
        assert!(lines.len() > 1);
        for line in &lines[..lines.len() - 1] {
            assert_eq!(line.len(), BASE64_LINE_LENGTH);
        }
        assert!(lines.last().unwrap().len() <= BASE64_LINE_LENGTH);
        assert!(!wrapped.ends_with("\r\n"));
    }

    #[test]
    fn test_base64_wrapped_short_input() {
        assert_eq!(encode_base64_wrapped(b"hi", BASE64_LINE_LENGTH), "aGk=");
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");

        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_encodes_control_characters() {
        let encoded = encode_rfc2047("line\r\nBcc: x@y", "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings(b"a\nb"), b"a\r\nb");
        assert_eq!(normalize_line_endings(b"a\r\nb"), b"a\r\nb");
        assert_eq!(normalize_line_endings(b"a\rb"), b"a\r\nb");
        assert_eq!(normalize_line_endings(b"a\n\nb\r\n"), b"a\r\n\r\nb\r\n");
    }

    proptest! {
        #[test]
        fn base64_wrapped_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let wrapped = encode_base64_wrapped(&data, BASE64_LINE_LENGTH);
            prop_assert_eq!(decode_base64(&wrapped).unwrap(), data);
        }

        #[test]
        fn normalized_text_has_no_bare_newlines(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let normalized = normalize_line_endings(&data);
            for (i, byte) in normalized.iter().enumerate() {
                if *byte == b'\n' {
                    prop_assert!(i > 0 && normalized[i - 1] == b'\r');
                }
                if *byte == b'\r' {
                    prop_assert_eq!(normalized.get(i + 1), Some(&b'\n'));
                }
            }
        }
    }
}
