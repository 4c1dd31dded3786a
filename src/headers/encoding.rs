//! Conversion between header octets and strings.
//!
//! Header bytes are decoded as UTF-8 when valid, otherwise each octet is mapped to the code
//! point of the same value (ISO-8859-1). Encoding always produces UTF-8.
use std::borrow::Cow;

/// Decode header octets.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match str::from_utf8(bytes) {
        Ok(ok) => Cow::Borrowed(ok),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Encode a header string into octets.
#[inline]
pub fn encode(value: &str) -> &[u8] {
    value.as_bytes()
}

/// Returns `true` if `name` is a valid header field name token.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_tchar)
}

/// Returns `true` if `value` contains no CR, LF or NUL.
pub fn is_valid_value(value: &str) -> bool {
    !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}

const fn is_tchar(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z'
    )
}
