//! Request accept loop.
use std::sync::Arc;

use crate::context::{DisconnectListener, RequestContext};
use crate::error::Error;
use crate::headers::KnownHeader;
use crate::http;
use crate::log::{debug, error, info, warning};
use crate::native::{
    IoHandle, MultipleKnownHeaders, NativeRequestContext, NativeStatus, Received, RequestBlob,
    ResponseHead, SendFlags, Transport,
};
use crate::options::Options;

/// Receives requests from a [`Transport`] and turns them into [`RequestContext`]s.
pub struct Server {
    transport: Arc<dyn Transport>,
    options: Arc<Options>,
    disconnect: DisconnectListener,
}

impl Server {
    pub fn new(transport: Arc<dyn Transport>, options: Options) -> Self {
        Self {
            disconnect: DisconnectListener::new(transport.clone()),
            transport,
            options: Arc::new(options),
        }
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Wait for the next well-formed request.
    ///
    /// Malformed request blobs are answered with `400` and skipped. Fails when the listener
    /// fails, e.g: [`NativeStatus::OPERATION_ABORTED`] after it was closed.
    pub async fn accept(&self) -> Result<RequestContext, Error> {
        loop {
            if let Some(blob) = self.receive().await? {
                let connection = self.disconnect.token_for_connection(blob.connection_id);
                return Ok(RequestContext::new(
                    self.transport.clone(),
                    self.options.clone(),
                    blob,
                    &connection,
                ));
            }
        }
    }

    async fn receive(&self) -> Result<Option<RequestBlob>, Error> {
        let mut native = NativeRequestContext::new(0, self.options.request_buffer_size)?;
        let info = loop {
            let (request_id, io) = (native.request_id(), native.io_handle());
            match self.transport.receive_request(request_id, native.buffer_mut(), io).await? {
                Received::Complete(info) => break info,
                Received::MoreData { request_id, required } => {
                    debug!("request {request_id}: receive buffer too small, {required} bytes required");
                    native.reset(request_id, required)?;
                }
            }
        };

        let request_id = info.request_id;
        match native.release_pins(info) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) => {
                warning!("request {request_id}: malformed request: {err}");
                self.send_error(request_id, 400).await;
                Ok(None)
            }
        }
    }

    /// Respond to a request with an empty body error response.
    ///
    /// `401` responses carry the configured authentication challenges.
    pub async fn send_error(&self, request_id: u64, status: u16) {
        let mut head = ResponseHead::new(status, http::reason_phrase(status));
        head.known[KnownHeader::ContentLength.index()] = Some("0".to_owned());
        if status == 401 {
            if let Some(auth) = &self.options.authentication {
                let challenges = auth.challenges();
                match challenges.len() {
                    0 => {}
                    1 => head.known[KnownHeader::WwwAuthenticate.index()] = challenges.into_iter().next(),
                    _ => head.multi_known.push(MultipleKnownHeaders {
                        id: KnownHeader::WwwAuthenticate,
                        values: challenges,
                        preserve_order: true,
                    }),
                }
            }
        }

        let io = IoHandle::new();
        let result = self.transport.send(request_id, Some(&head), &[], SendFlags::NONE, io).await;
        if let Err(_status) = result {
            debug!("request {request_id}: failed to send {status} response: {_status}");
        }
    }

    /// Accept requests until the listener closes, each handled on its own task.
    ///
    /// The handler returns the context back, which is then disposed.
    pub async fn serve<F, Fut>(self, handler: F) -> Result<(), Error>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RequestContext> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!("serving requests");
        loop {
            let ctx = match self.accept().await {
                Ok(ctx) => ctx,
                Err(Error::Io(NativeStatus::OPERATION_ABORTED)) => {
                    info!("listener closed");
                    return Ok(());
                }
                Err(err) => {
                    error!("accept failed: {err}");
                    return Err(err);
                }
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let ctx = handler(ctx).await;
                ctx.dispose().await;
            });
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options)
            .field("disconnect", &self.disconnect)
            .finish_non_exhaustive()
    }
}
