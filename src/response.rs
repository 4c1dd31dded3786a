//! HTTP Response
//!
//! A [`Response`] moves forward through [`ResponseState`]: status and headers are mutable until
//! it starts, framing is computed on the first flush, and the head is sent together with the
//! first body bytes.
use std::sync::Arc;
use std::time::Duration;

use crate::context::Shared;
use crate::error::{Error, UsageError};
use crate::headers::{HeaderCollection, KnownHeader, contains_token, names};
use crate::http::{self, BoundaryType, Version, parse_content_length};
use crate::log::{debug, trace};
use crate::native::{MultipleKnownHeaders, ResponseHead, SendFlags};
use crate::request::RequestFacts;

mod buffer;
mod chunked;
mod state;
mod stream;

pub use buffer::BufferBuilder;
pub use state::{InvalidTransition, ResponseState, StateMachine};
pub use stream::{MAX_BUFFER_SIZE, ResponseBody, ResponseStream};

/// Error type returned by on-completed callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type StartingCallback = Box<dyn FnOnce(&mut Response) + Send + Sync>;
type CompletedCallback = Box<dyn FnOnce() -> Result<(), BoxError> + Send + Sync>;

/// Response of a [`RequestContext`](crate::context::RequestContext).
pub struct Response {
    shared: Arc<Shared>,
    facts: RequestFacts,
    state: StateMachine,
    status: u16,
    reason: Option<String>,
    headers: HeaderCollection,
    boundary: BoundaryType,
    expected_body_length: u64,
    should_buffer: bool,
    cache_ttl: Option<Duration>,
    on_starting: Vec<StartingCallback>,
    on_completed: Vec<CompletedCallback>,
    stream: ResponseStream,
}

impl Response {
    pub(crate) fn new(shared: Arc<Shared>, facts: RequestFacts) -> Self {
        Self {
            should_buffer: shared.options.buffer_responses,
            shared,
            facts,
            state: StateMachine::new(),
            status: 200,
            reason: None,
            headers: HeaderCollection::new(),
            boundary: BoundaryType::None,
            expected_body_length: 0,
            cache_ttl: None,
            on_starting: Vec::new(),
            on_completed: Vec::new(),
            stream: ResponseStream::new(),
        }
    }

    // ===== State =====

    #[inline]
    pub fn state(&self) -> ResponseState {
        self.state.current()
    }

    /// Returns `true` once status and headers became read-only.
    #[inline]
    pub fn has_started(&self) -> bool {
        self.state.reached(ResponseState::Started)
    }

    #[inline]
    pub fn has_computed_headers(&self) -> bool {
        self.state.reached(ResponseState::ComputedHeaders)
    }

    #[inline]
    pub fn has_started_sending(&self) -> bool {
        self.state.reached(ResponseState::StartedSending)
    }

    fn ensure_not_started(&self) -> Result<(), Error> {
        match self.has_started() {
            true => Err(UsageError::ResponseStarted.into()),
            false => Ok(()),
        }
    }

    // ===== Status =====

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Set the status code, `101..=999`.
    pub fn set_status_code(&mut self, status: u16) -> Result<(), Error> {
        self.ensure_not_started()?;
        if !http::is_valid_status(status) {
            return Err(UsageError::InvalidStatusCode(status).into());
        }
        self.status = status;
        Ok(())
    }

    /// Returns the custom reason phrase, or the default one of the status code.
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => http::reason_phrase(self.status),
        }
    }

    /// Set a custom reason phrase, `None` restores the default.
    pub fn set_reason_phrase(&mut self, reason: Option<String>) -> Result<(), Error> {
        self.ensure_not_started()?;
        self.reason = reason;
        Ok(())
    }

    // ===== Headers =====

    #[inline]
    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// Returns the mutable header collection, mutation fails once the response started.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    /// Returns the parsed `Content-Length` header.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get(names::CONTENT_LENGTH).and_then(|v| parse_content_length(&v))
    }

    /// Set or remove the `Content-Length` header.
    pub fn set_content_length(&mut self, len: Option<u64>) -> Result<(), Error> {
        self.ensure_not_started()?;
        match len {
            Some(len) => self.headers.set(names::CONTENT_LENGTH, itoa::Buffer::new().format(len))?,
            None => {
                self.headers.remove(names::CONTENT_LENGTH)?;
            }
        }
        Ok(())
    }

    /// Returns how the body is delimited, decided on the first flush.
    #[inline]
    pub fn boundary(&self) -> BoundaryType {
        self.boundary
    }

    /// Returns the declared body length when framed by `Content-Length`.
    #[inline]
    pub fn expected_body_length(&self) -> u64 {
        self.expected_body_length
    }

    #[inline]
    pub fn should_buffer(&self) -> bool {
        self.should_buffer
    }

    /// Enable or disable buffering of small writes, applies to later writes only.
    #[inline]
    pub fn set_should_buffer(&mut self, enabled: bool) {
        self.should_buffer = enabled;
    }

    #[inline]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Set the kernel response cache lifetime hint.
    pub fn set_cache_ttl(&mut self, ttl: Option<Duration>) -> Result<(), Error> {
        self.ensure_not_started()?;
        self.cache_ttl = ttl;
        Ok(())
    }

    // ===== Callbacks =====

    /// Register a callback run right before the response starts, in reverse registration
    /// order.
    ///
    /// Callbacks may still change status and headers.
    pub fn on_starting<F>(&mut self, callback: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Response) + Send + Sync + 'static,
    {
        self.ensure_not_started()?;
        self.on_starting.push(Box::new(callback));
        Ok(())
    }

    /// Register a callback run once after the request is disposed, in reverse registration
    /// order.
    ///
    /// Errors and panics of the callback are logged and do not affect other callbacks.
    pub fn on_completed<F>(&mut self, callback: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_completed.push(Box::new(callback));
    }

    pub(crate) fn take_on_completed(&mut self) -> Vec<CompletedCallback> {
        let mut callbacks = std::mem::take(&mut self.on_completed);
        callbacks.reverse();
        callbacks
    }

    // ===== Lifecycle =====

    /// Run the on-starting callbacks and make status and headers read-only.
    ///
    /// Calling it again has no effect.
    pub fn start(&mut self) {
        if self.has_started() {
            return;
        }
        // callbacks may register further callbacks
        while !self.on_starting.is_empty() {
            let callbacks = std::mem::take(&mut self.on_starting);
            for callback in callbacks.into_iter().rev() {
                callback(self);
            }
        }
        // a callback may have started the response already
        if !self.has_started() {
            self.state.advance(ResponseState::Started).ok();
        }
        self.headers.lock();
        trace!("request {}: response started with {}", self.shared.request_id, self.status);
    }

    /// Discard status, headers, and buffered body to start over.
    ///
    /// Once the head has been sent the request is aborted instead.
    pub fn reset(&mut self) -> Result<(), Error> {
        if let Err(err) = self.state.reset() {
            debug!("request {}: reset after the head was sent", self.shared.request_id);
            self.shared.abort();
            return Err(err.into());
        }
        self.status = 200;
        self.reason = None;
        self.cache_ttl = None;
        self.headers.reset();
        self.boundary = BoundaryType::None;
        self.expected_body_length = 0;
        self.stream.reset();
        Ok(())
    }

    /// Returns the body writer.
    #[inline]
    pub fn body(&mut self) -> ResponseBody<'_> {
        ResponseBody::new(self)
    }

    /// Returns `false` if body bytes are discarded, for `HEAD` requests and no-body statuses.
    pub(crate) fn body_allowed(&self) -> bool {
        self.stream.opaque || (!self.facts.is_head && http::can_have_body(self.status))
    }

    pub(crate) fn mark_closed(&mut self) {
        self.stream.closed = true;
        if !self.state.reached(ResponseState::Closed) {
            self.state.advance(ResponseState::Closed).ok();
        }
    }

    // ===== Framing =====

    /// Decide body framing and keep-alive.
    ///
    /// `end_of_request` is set when the whole body is known, `buffered` bytes long. Returns
    /// [`SendFlags::DISCONNECT`] when the connection must close after the response.
    pub(crate) fn compute_headers(&mut self, end_of_request: bool, buffered: u64) -> Result<SendFlags, Error> {
        self.state.advance(ResponseState::ComputedHeaders)?;
        self.headers.unlock();
        let result = self.decide_framing(end_of_request, buffered);
        self.headers.lock();
        result
    }

    fn decide_framing(&mut self, end_of_request: bool, buffered: u64) -> Result<SendFlags, Error> {
        if self.status == 401 {
            if let Some(auth) = self.shared.options.authentication.clone() {
                for challenge in auth.challenges() {
                    self.headers.append(names::WWW_AUTHENTICATE, challenge)?;
                }
            }
        }

        let facts = self.facts;
        let close_set = self
            .headers
            .get(names::CONNECTION)
            .is_some_and(|v| contains_token(&v, "close"));
        let chunked_set = self
            .headers
            .get(names::TRANSFER_ENCODING)
            .is_some_and(|v| contains_token(&v, "chunked"));

        let mut keep_alive = !(facts.version <= Version::HTTP_10
            || (facts.version == Version::HTTP_11 && facts.close_requested)
            || close_set);

        if !http::can_have_body(self.status) {
            self.headers.remove(names::CONTENT_LENGTH)?;
            self.headers.remove(names::TRANSFER_ENCODING)?;
            self.boundary = BoundaryType::None;
            self.expected_body_length = 0;
        } else if let Some(len) = self.content_length() {
            self.boundary = BoundaryType::ContentLength;
            self.expected_body_length = len;
        } else if chunked_set {
            self.boundary = BoundaryType::PassThrough;
        } else if end_of_request && !facts.is_head {
            self.headers.set(names::CONTENT_LENGTH, itoa::Buffer::new().format(buffered))?;
            self.boundary = BoundaryType::ContentLength;
            self.expected_body_length = buffered;
        } else if keep_alive && facts.version >= Version::HTTP_11 {
            self.headers.set(names::TRANSFER_ENCODING, "chunked")?;
            self.boundary = BoundaryType::Chunked;
        } else {
            keep_alive = false;
            self.boundary = BoundaryType::Close;
        }

        trace!(
            "request {}: framing {:?}, keep-alive {keep_alive}",
            self.shared.request_id, self.boundary
        );

        if keep_alive {
            return Ok(SendFlags::NONE);
        }
        if !close_set {
            self.headers.append(names::CONNECTION, "close")?;
        }
        Ok(SendFlags::DISCONNECT)
    }

    /// Compute framing if needed, and the number of body bytes left to write.
    pub(crate) fn compute_left_to_write(&mut self, end_of_request: bool, buffered: u64) -> Result<SendFlags, Error> {
        let flags = match self.has_computed_headers() {
            true => SendFlags::NONE,
            false => self.compute_headers(end_of_request, buffered)?,
        };
        if self.stream.left_to_write.is_none() {
            let left = if !self.body_allowed() {
                0
            } else if self.boundary == BoundaryType::ContentLength {
                self.expected_body_length as i64
            } else {
                -1
            };
            self.stream.left_to_write = Some(left);
        }
        Ok(flags)
    }

    /// Serialize status and headers into the listener layout, and mark the head as sent.
    ///
    /// In opaque mode `Connection` is passed as an unknown header so the listener keeps it
    /// verbatim.
    pub(crate) fn begin_send_head(&mut self, opaque: bool) -> Result<ResponseHead, Error> {
        self.state.advance(ResponseState::StartedSending)?;

        let mut head = ResponseHead::new(self.status, self.reason_phrase());
        head.cache_ttl = self.cache_ttl;

        for (name, values) in self.headers.iter() {
            let known = KnownHeader::from_name(name).filter(|id| !(opaque && *id == KnownHeader::Connection));
            match (known, values) {
                (None, values) => {
                    for value in values {
                        head.unknown.push((name.to_owned(), value.clone()));
                    }
                }
                (Some(id), [value]) => head.known[id.index()] = Some(value.clone()),
                (Some(id), values) => head.multi_known.push(MultipleKnownHeaders {
                    id,
                    values: values.to_vec(),
                    preserve_order: true,
                }),
            }
        }

        Ok(head)
    }

    /// Send the `101` head and switch both directions into an opaque stream.
    pub(crate) async fn send_opaque_upgrade(&mut self) -> Result<(), Error> {
        self.set_status_code(101)?;
        self.start();
        self.state.advance(ResponseState::ComputedHeaders)?;
        self.boundary = BoundaryType::Close;
        self.should_buffer = false;
        self.stream.switch_to_opaque();

        let head = self.begin_send_head(true)?;
        let flags = SendFlags::OPAQUE | SendFlags::MORE_DATA | SendFlags::BUFFER_DATA;
        match self.shared.send(Some(&head), &[], flags).await {
            Ok(_) => Ok(()),
            Err(status) => {
                debug!("request {}: upgrade failed: {status}", self.shared.request_id);
                self.shared.abort();
                Err(Error::Io(status))
            }
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("state", &self.state.current())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("boundary", &self.boundary)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test;
