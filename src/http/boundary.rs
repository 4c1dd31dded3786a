/// How a message body is delimited on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundaryType {
    /// No body.
    #[default]
    None,
    /// `Transfer-Encoding: chunked` applied by the pipeline.
    Chunked,
    /// Body length declared by `Content-Length`.
    ContentLength,
    /// Body ends when the connection closes.
    Close,
    /// Application supplied `Transfer-Encoding`, bytes are sent as written.
    PassThrough,
    /// Unparsable `Content-Length` on a request.
    Invalid,
}

/// Parse a `Content-Length` value, surrounding whitespace allowed.
pub fn parse_content_length(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
