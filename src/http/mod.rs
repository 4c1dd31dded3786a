//! HTTP Protocol primitives.
mod boundary;
mod method;
mod status;
mod version;

pub use boundary::{BoundaryType, parse_content_length};
pub use method::Method;
pub use status::{reason_phrase, can_have_body, is_valid_status};
pub use version::Version;
