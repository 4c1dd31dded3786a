//! Request target decoding.
//!
//! The raw target is kept as sent by the client. The path is decoded here instead of using the
//! listener's cooked form so that an escaped `/` stays distinguishable from a segment
//! separator.
use crate::log::debug;

const SCHEMES: [&[u8]; 2] = [b"http://", b"https://"];

/// Returns the path portion of a raw request target.
///
/// Origin form targets yield everything before `?` or `#`. Absolute form targets are reduced to
/// the path after the authority, empty when there is none. Any other form yields an empty path.
pub fn raw_path(target: &[u8]) -> &[u8] {
    let rest = match after_authority(target) {
        Some(rest) => rest,
        None => return &[],
    };
    let end = rest.iter().position(|&b| matches!(b, b'?' | b'#')).unwrap_or(rest.len());
    &rest[..end]
}

/// Returns the query of a raw request target including the leading `?`, empty if none.
pub fn raw_query(target: &[u8]) -> &[u8] {
    let rest = after_authority(target).unwrap_or(target);
    let Some(start) = rest.iter().position(|&b| b == b'?') else {
        return &[];
    };
    let rest = &rest[start..];
    let end = rest.iter().position(|&b| b == b'#').unwrap_or(rest.len());
    &rest[..end]
}

/// Strip scheme and authority of an absolute form target, `None` for asterisk and authority
/// form, or absolute form without a path.
fn after_authority(target: &[u8]) -> Option<&[u8]> {
    if target.first() == Some(&b'/') {
        return Some(target);
    }
    let scheme = SCHEMES
        .iter()
        .find(|s| target.len() >= s.len() && target[..s.len()].eq_ignore_ascii_case(s))?;
    let authority = &target[scheme.len()..];
    let end = authority.iter().position(|&b| matches!(b, b'/' | b'?' | b'#'))?;
    match authority[end] {
        b'/' => Some(&authority[end..]),
        _ => None,
    }
}

/// Percent-decode a raw path.
///
/// Escaped octets are collected until a literal character or the end of input and decoded as
/// UTF-8 together. `%2F` and `%2f` are kept verbatim, malformed escapes are kept literally.
/// If the octets are not valid UTF-8, `cooked_path` is returned instead. An empty path
/// decodes to `/`.
pub fn decode_path(raw_path: &[u8], cooked_path: &str) -> String {
    if raw_path.is_empty() {
        return "/".to_owned();
    }

    let mut out = String::with_capacity(raw_path.len());
    let mut octets = Vec::new();
    let mut i = 0;

    while i < raw_path.len() {
        let b = raw_path[i];
        match (b, hex_pair(&raw_path[i + 1..])) {
            (b'%', Some(b'/')) => {
                if !flush(&mut octets, &mut out) {
                    return fallback(raw_path, cooked_path);
                }
                out.push('%');
                out.push(raw_path[i + 1] as char);
                out.push(raw_path[i + 2] as char);
                i += 3;
            }
            (b'%', Some(octet)) => {
                octets.push(octet);
                i += 3;
            }
            _ if b.is_ascii() => {
                if !flush(&mut octets, &mut out) {
                    return fallback(raw_path, cooked_path);
                }
                out.push(b as char);
                i += 1;
            }
            _ => {
                octets.push(b);
                i += 1;
            }
        }
    }

    if !flush(&mut octets, &mut out) {
        return fallback(raw_path, cooked_path);
    }
    out
}

fn hex_pair(src: &[u8]) -> Option<u8> {
    match src {
        [hi, lo, ..] => Some(hex(*hi)? << 4 | hex(*lo)?),
        _ => None,
    }
}

const fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn flush(octets: &mut Vec<u8>, out: &mut String) -> bool {
    if octets.is_empty() {
        return true;
    }
    match str::from_utf8(octets) {
        Ok(ok) => {
            out.push_str(ok);
            octets.clear();
            true
        }
        Err(_) => false,
    }
}

fn fallback(raw_path: &[u8], cooked_path: &str) -> String {
    debug!("path {:?} is not valid utf8 after decoding, using cooked path", String::from_utf8_lossy(raw_path));
    let _ = raw_path;
    cooked_path.to_owned()
}

/// Split a decoded path into path base and remaining path.
///
/// The longest prefix that matches on a segment boundary wins, compared ASCII
/// case-insensitively. A path equal to a prefix without its trailing slash yields an empty
/// remaining path.
pub fn split_path_base<'a>(path: &'a str, prefixes: &[String]) -> (&'a str, &'a str) {
    let mut best = 0;
    for prefix in prefixes {
        let prefix = prefix.trim_end_matches('/').as_bytes();
        let bytes = path.as_bytes();
        if prefix.len() <= best || bytes.len() < prefix.len() {
            continue;
        }
        if bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
            && matches!(bytes.get(prefix.len()), None | Some(b'/'))
        {
            best = prefix.len();
        }
    }
    path.split_at(best)
}
