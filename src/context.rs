//! Per-request context.
//!
//! A [`RequestContext`] owns the [`Request`] and [`Response`] of one received request. It must be
//! finished with [`RequestContext::dispose`], dropping it without disposing aborts the request.
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::{Error, UsageError};
use crate::log::{debug, error, trace, warning};
use crate::native::{RequestBlob, Transport};
use crate::options::Options;
use crate::request::Request;
use crate::response::Response;

mod disconnect;
mod opaque;
mod shared;

pub use disconnect::DisconnectListener;
pub use opaque::OpaqueStream;
pub(crate) use shared::{Shared, cancellable};

/// A received request together with its response.
pub struct RequestContext {
    shared: Arc<Shared>,
    request: Request,
    response: Response,
    disposed: bool,
}

impl RequestContext {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: Arc<Options>,
        blob: RequestBlob,
        connection: &CancellationToken,
    ) -> Self {
        let shared = Arc::new(Shared::new(
            transport,
            options,
            blob.request_id,
            blob.connection_id,
            connection,
        ));
        let request = Request::new(shared.clone(), blob);
        let response = Response::new(shared.clone(), request.facts());
        trace!("request {}: context created", shared.request_id);
        Self { shared, request, response, disposed: false }
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[inline]
    pub fn response(&self) -> &Response {
        &self.response
    }

    #[inline]
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Borrow request and response mutably at the same time.
    #[inline]
    pub fn parts_mut(&mut self) -> (&mut Request, &mut Response) {
        (&mut self.request, &mut self.response)
    }

    #[inline]
    pub fn request_id(&self) -> u64 {
        self.shared.request_id
    }

    /// Returns the request id formatted as a GUID, e.g:
    /// `00000000-0000-0000-0000-00000000002a`.
    pub fn trace_identifier(&self) -> String {
        let id = self.shared.request_id;
        format!("00000000-0000-0000-{:04x}-{:012x}", id >> 48, id & 0xffff_ffff_ffff)
    }

    /// Returns a token cancelled when the request is aborted or the client disconnects.
    #[inline]
    pub fn disconnect_token(&self) -> CancellationToken {
        self.shared.token()
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Forcefully terminate the request, further body operations fail.
    #[inline]
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Returns a handle which can abort the request from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle { shared: self.shared.clone() }
    }

    /// Abort the request when `token` is cancelled, until the returned registration is dropped.
    pub fn register_for_cancellation(&self, token: CancellationToken) -> CancellationRegistration {
        if token.is_cancelled() {
            self.shared.abort();
            return CancellationRegistration { task: None };
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warning!("request {}: no runtime, cancellation registration ignored", self.shared.request_id);
            return CancellationRegistration { task: None };
        };
        let shared = self.shared.clone();
        let task = handle.spawn(async move {
            token.cancelled().await;
            shared.abort();
        });
        CancellationRegistration { task: Some(task) }
    }

    /// Returns `true` if the request has no body and the listener supports opaque streams.
    #[inline]
    pub fn is_upgradable_request(&self) -> bool {
        self.request.is_upgradable()
    }

    /// Respond with `101 Switching Protocols` and switch into a duplex opaque stream.
    ///
    /// Status and headers set so far, e.g: `Upgrade`, are sent with the `101` head.
    pub async fn upgrade(&mut self) -> Result<OpaqueStream<'_>, Error> {
        if !self.is_upgradable_request() {
            return Err(UsageError::NotUpgradable.into());
        }
        if self.response.has_started() {
            return Err(UsageError::ResponseStarted.into());
        }
        self.response.send_opaque_upgrade().await?;
        debug!("request {}: upgraded to opaque stream", self.shared.request_id);

        let Self { request, response, .. } = self;
        Ok(OpaqueStream::new(request.switch_to_opaque_mode(), response.body()))
    }

    /// Complete the request.
    ///
    /// Unless aborted, the response is started and the final send issued. On-completed
    /// callbacks run afterward exactly once.
    pub async fn dispose(mut self) {
        if self.shared.is_aborted() {
            trace!("request {}: aborted, final send skipped", self.shared.request_id);
            self.response.mark_closed();
        } else {
            self.response.body().finish().await;
        }
        self.complete();
    }

    fn complete(&mut self) {
        self.disposed = true;
        for callback in self.response.take_on_completed() {
            match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
                Ok(Ok(())) => {}
                Ok(Err(_err)) => {
                    error!("request {}: on-completed callback failed: {_err}", self.shared.request_id);
                }
                Err(_) => {
                    error!("request {}: on-completed callback panicked", self.shared.request_id);
                }
            }
        }
        self.request.dispose();
        trace!("request {}: disposed", self.shared.request_id);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.disposed {
            debug!("request {}: dropped without dispose", self.shared.request_id);
            self.shared.abort();
            self.complete();
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("aborted", &self.shared.is_aborted())
            .finish()
    }
}

// ===== AbortHandle =====

/// Aborts a request from outside its task.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

impl AbortHandle {
    #[inline]
    pub fn abort(&self) {
        self.shared.abort();
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Cancel the send currently in flight, if any.
    #[inline]
    pub fn cancel_last_write(&self) {
        self.shared.cancel_last_write();
    }
}

// ===== CancellationRegistration =====

/// Returned by [`RequestContext::register_for_cancellation`], dropping it unregisters.
#[derive(Debug)]
pub struct CancellationRegistration {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod test;
