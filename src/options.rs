//! Server configuration.
use std::sync::Arc;

/// Produces `WWW-Authenticate` challenges for `401` responses.
pub trait AuthenticationChallenge: Send + Sync {
    /// Returns the challenge values, each emitted as a separate header value.
    fn challenges(&self) -> Vec<String>;
}

impl<F> AuthenticationChallenge for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    #[inline]
    fn challenges(&self) -> Vec<String> {
        self()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct Options {
    /// Initial size of the native receive buffer, grown on "more data".
    pub request_buffer_size: usize,
    /// Default of [`Response::should_buffer`].
    ///
    /// [`Response::should_buffer`]: crate::response::Response::should_buffer
    pub buffer_responses: bool,
    /// Default request body limit, `None` for unlimited.
    pub max_request_body_size: Option<u64>,
    /// Registered path prefixes used to split `PathBase` from `Path`.
    pub url_prefixes: Vec<String>,
    /// Treat native write failures as success.
    pub ignore_write_errors: bool,
    /// Challenge provider for `401` responses.
    pub authentication: Option<Arc<dyn AuthenticationChallenge>>,
}

impl Options {
    /// Default request buffer size.
    pub const DEFAULT_REQUEST_BUFFER_SIZE: usize = 4096;

    /// Default request body limit, roughly 28.6 MiB.
    pub const DEFAULT_MAX_REQUEST_BODY_SIZE: u64 = 30_000_000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_buffer_size(mut self, size: usize) -> Self {
        self.request_buffer_size = size;
        self
    }

    pub fn with_buffer_responses(mut self, enabled: bool) -> Self {
        self.buffer_responses = enabled;
        self
    }

    pub fn with_max_request_body_size(mut self, limit: Option<u64>) -> Self {
        self.max_request_body_size = limit;
        self
    }

    /// Register a path prefix, e.g: `/app/`.
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefixes.push(prefix.into());
        self
    }

    pub fn with_ignore_write_errors(mut self, ignore: bool) -> Self {
        self.ignore_write_errors = ignore;
        self
    }

    pub fn with_authentication<A: AuthenticationChallenge + 'static>(mut self, auth: A) -> Self {
        self.authentication = Some(Arc::new(auth));
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            request_buffer_size: Self::DEFAULT_REQUEST_BUFFER_SIZE,
            buffer_responses: true,
            max_request_body_size: Some(Self::DEFAULT_MAX_REQUEST_BODY_SIZE),
            url_prefixes: Vec::new(),
            ignore_write_errors: false,
            authentication: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("request_buffer_size", &self.request_buffer_size)
            .field("buffer_responses", &self.buffer_responses)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("url_prefixes", &self.url_prefixes)
            .field("ignore_write_errors", &self.ignore_write_errors)
            .field("authentication", &self.authentication.is_some())
            .finish()
    }
}
