/// An error that can occur when mutating a [`HeaderCollection`].
///
/// [`HeaderCollection`]: super::HeaderCollection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderError {
    /// The collection has been locked because the response started.
    ReadOnly,
    /// Header name is empty or contains a non token character.
    InvalidName,
    /// Header value contains a control character.
    InvalidValue,
}

impl HeaderError {
    pub(crate) const fn message(&self) -> &'static str {
        match self {
            Self::ReadOnly => "headers are read-only, response has already started",
            Self::InvalidName => "invalid header name",
            Self::InvalidValue => "invalid header value",
        }
    }
}

impl std::error::Error for HeaderError {}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
