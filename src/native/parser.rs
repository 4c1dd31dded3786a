//! Request head parsing of the raw blob.
//!
//! The listener already validated the message, so parsing only splits lines and fields. Bare
//! `LF` line endings are accepted.
use bytes::Bytes;

use crate::headers::{HeaderCollection, encoding};
use crate::http::{Method, Version};

/// Parsed request head.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub raw_method: String,
    pub target: Bytes,
    pub version: Version,
    pub headers: HeaderCollection,
}

pub(crate) fn parse_head(bytes: &Bytes) -> Result<RequestHead, ParseError> {
    let mut cursor = bytes.clone();

    let line = split_line(&mut cursor)?;
    let (raw_method, target, version) = parse_request_line(&line)?;

    let mut headers = HeaderCollection::with_capacity(16);
    loop {
        let line = split_line(&mut cursor)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = parse_header_line(&line)?;
        headers.push(&encoding::decode(name), encoding::decode(value).into_owned());
    }

    Ok(RequestHead {
        method: Method::from_bytes(&raw_method),
        // method is validated as token
        raw_method: String::from_utf8_lossy(&raw_method).into_owned(),
        target,
        version,
        headers,
    })
}

/// Split one line off the front, without its line terminator.
fn split_line(bytes: &mut Bytes) -> Result<Bytes, ParseError> {
    let Some(lf) = bytes.iter().position(|&b| b == b'\n') else {
        return Err(ParseError::Incomplete);
    };
    let mut line = bytes.split_to(lf + 1);
    line.truncate(lf);
    if line.last() == Some(&b'\r') {
        line.truncate(lf - 1);
    }
    Ok(line)
}

fn parse_request_line(line: &Bytes) -> Result<(Bytes, Bytes, Version), ParseError> {
    let mut parts = line.split(|&b| b == b' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidSeparator);
    };

    if method.is_empty() || !method.iter().all(|&b| is_tchar(b)) {
        return Err(ParseError::InvalidMethod);
    }
    if target.is_empty() || target.iter().any(|&b| b <= b' ' || b == 0x7f) {
        return Err(ParseError::InvalidTarget);
    }
    let Some(version) = Version::from_bytes(version) else {
        return Err(ParseError::UnsupportedVersion);
    };

    Ok((line.slice_ref(method), line.slice_ref(target), version))
}

fn parse_header_line(line: &[u8]) -> Result<(&[u8], &[u8]), ParseError> {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return Err(ParseError::InvalidHeader);
    };
    let (name, value) = (&line[..colon], &line[colon + 1..]);
    if name.is_empty() || !name.iter().all(|&b| is_tchar(b)) {
        return Err(ParseError::InvalidHeader);
    }
    Ok((name, value.trim_ascii()))
}

const fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~'
    )
}

// ===== Error =====

/// Malformed request blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blob ends before the head or a declared entity chunk is complete.
    Incomplete,
    /// Request line does not have exactly three parts.
    InvalidSeparator,
    /// Invalid character in method.
    InvalidMethod,
    /// Invalid character in request target.
    InvalidTarget,
    /// Unsupported version.
    UnsupportedVersion,
    /// Invalid header line.
    InvalidHeader,
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Incomplete => f.write_str("incomplete request blob"),
            Self::InvalidSeparator => f.write_str("invalid separator"),
            Self::InvalidMethod => f.write_str("invalid method"),
            Self::InvalidTarget => f.write_str("invalid request target"),
            Self::UnsupportedVersion => f.write_str("unsupported version"),
            Self::InvalidHeader => f.write_str("invalid header"),
        }
    }
}
