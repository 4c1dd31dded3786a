//! HTTP Headers.
//!
//! Header names are compared ASCII case-insensitively, values are kept in the order they were
//! set or received. The listener exchanges headers as raw octets, [`encoding`] converts between
//! those and the string view exposed here.
pub mod encoding;
mod collection;
mod known;
mod error;

pub use collection::{HeaderCollection, Iter};
pub use known::KnownHeader;
pub use error::HeaderError;

/// Header names the pipeline reads or writes itself.
pub mod names {
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

/// Returns `true` if a comma separated header value contains `token`, ASCII case-insensitive.
pub(crate) fn contains_token(value: &str, token: &str) -> bool {
    value.split(',').any(|e| e.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod test;
