//! Error types of the request pipeline.
use crate::headers::HeaderError;
use crate::native::{NativeStatus, ParseError};
use crate::response::InvalidTransition;

/// Error returned by request and response operations.
///
/// [`Error::Usage`] signals application misuse, every other variant signals a transport or
/// environment failure. Transport failures on a request are always preceded by aborting it.
#[derive(Debug)]
pub enum Error {
    /// Application misuse of the API.
    Usage(UsageError),
    /// Native listener call failed.
    Io(NativeStatus),
    /// Operation cancelled by a [`CancellationToken`].
    ///
    /// [`CancellationToken`]: crate::cancel::CancellationToken
    Canceled,
    /// Request body exceeded the configured maximum size.
    RequestBodyTooLarge,
    /// Header mutation rejected.
    Header(HeaderError),
    /// Listener delivered a malformed request head.
    Parse(ParseError),
    /// Request buffer allocation failed.
    Alloc,
    /// File could not be opened or read for sending.
    File(std::io::Error),
}

/// Application misuse of the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// More bytes written than declared in `Content-Length`.
    ContentLengthExceeded,
    /// Operation requires that the response has not started.
    ResponseStarted,
    /// Status code outside `101..=999`.
    InvalidStatusCode(u16),
    /// Request cannot be upgraded.
    NotUpgradable,
    /// Response state machine moved backward.
    InvalidTransition(InvalidTransition),
    /// Stream already closed.
    Disposed,
    /// File offset or count outside of the file.
    InvalidFileRange,
    /// Request body reading already started.
    BodyAlreadyStarted,
}

impl Error {
    /// Returns `true` if the error is caused by API misuse.
    #[inline]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Returns the native status code of a transport failure.
    #[inline]
    pub fn native_status(&self) -> Option<NativeStatus> {
        match self {
            Self::Io(status) => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn aborted() -> Self {
        Self::Io(NativeStatus::OPERATION_ABORTED)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Header(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::File(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(err) => std::fmt::Display::fmt(err, f),
            Self::Io(status) => write!(f, "native listener call failed: {status}"),
            Self::Canceled => f.write_str("operation cancelled"),
            Self::RequestBodyTooLarge => f.write_str("request body too large"),
            Self::Header(err) => std::fmt::Display::fmt(err, f),
            Self::Parse(err) => std::fmt::Display::fmt(err, f),
            Self::Alloc => f.write_str("failed to allocate request buffer"),
            Self::File(err) => write!(f, "failed to read file: {err}"),
        }
    }
}

impl std::error::Error for UsageError {}

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentLengthExceeded => {
                f.write_str("more bytes written than specified in the Content-Length header")
            }
            Self::ResponseStarted => f.write_str("response has already started"),
            Self::InvalidStatusCode(code) => write!(f, "invalid status code: {code}"),
            Self::NotUpgradable => f.write_str("request is not upgradable"),
            Self::InvalidTransition(t) => std::fmt::Display::fmt(t, f),
            Self::Disposed => f.write_str("stream is closed"),
            Self::InvalidFileRange => f.write_str("file offset or count out of range"),
            Self::BodyAlreadyStarted => f.write_str("request body has already been read"),
        }
    }
}

impl From<UsageError> for Error {
    #[inline]
    fn from(value: UsageError) -> Self {
        Self::Usage(value)
    }
}

impl From<HeaderError> for Error {
    #[inline]
    fn from(value: HeaderError) -> Self {
        Self::Header(value)
    }
}

impl From<ParseError> for Error {
    #[inline]
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<InvalidTransition> for Error {
    #[inline]
    fn from(value: InvalidTransition) -> Self {
        Self::Usage(UsageError::InvalidTransition(value))
    }
}

impl From<NativeStatus> for Error {
    #[inline]
    fn from(value: NativeStatus) -> Self {
        Self::Io(value)
    }
}
