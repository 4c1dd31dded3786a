use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::Error;
use crate::log::{debug, trace};
use crate::native::{DataChunk, IoHandle, NativeStatus, ResponseHead, SendFlags, Transport};
use crate::options::Options;

/// State shared by the request, the response, and abort handles of one request.
pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) options: Arc<Options>,
    pub(crate) request_id: u64,
    pub(crate) connection_id: u64,
    aborted: AtomicBool,
    abort_source: CancellationSource,
    pending_read: Mutex<Option<IoHandle>>,
    last_write: Mutex<Option<IoHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: Arc<Options>,
        request_id: u64,
        connection_id: u64,
        connection: &CancellationToken,
    ) -> Self {
        Self {
            transport,
            options,
            request_id,
            connection_id,
            aborted: AtomicBool::new(false),
            abort_source: CancellationSource::linked(connection),
            pending_read: Mutex::new(None),
            last_write: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Token cancelled on abort or when the connection drops.
    #[inline]
    pub(crate) fn token(&self) -> CancellationToken {
        self.abort_source.token()
    }

    /// Forcefully terminate the request, only the first call has any effect.
    pub(crate) fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("request {}: abort", self.request_id);
        self.abort_source.cancel();

        match self.transport.cancel_request(self.request_id) {
            Ok(()) => {}
            // the final write already started, only that write can still be cancelled
            Err(NativeStatus::CONNECTION_INVALID) => self.cancel_last_write(),
            Err(_err) => {
                debug!("request {}: cancel failed: {_err}", self.request_id);
            }
        }

        if let Some(io) = lock(&self.pending_read).take() {
            let _ = self.transport.cancel_pending_io(io);
        }
    }

    /// Cancel the in-flight send, if any.
    pub(crate) fn cancel_last_write(&self) {
        if let Some(io) = lock(&self.last_write).take() {
            trace!("request {}: cancel last write {}", self.request_id, io.id());
            let _ = self.transport.cancel_pending_io(io);
        }
    }

    pub(crate) async fn receive_body(&self, buf: &mut [u8]) -> Result<usize, NativeStatus> {
        if self.is_aborted() {
            return Err(NativeStatus::OPERATION_ABORTED);
        }
        let io = IoHandle::new();
        *lock(&self.pending_read) = Some(io);
        let result = self.transport.receive_entity_body(self.request_id, buf, io).await;
        lock(&self.pending_read).take();
        result
    }

    pub(crate) async fn send(
        &self,
        head: Option<&ResponseHead>,
        chunks: &[DataChunk<'_>],
        flags: SendFlags,
    ) -> Result<u64, NativeStatus> {
        if self.is_aborted() {
            return Err(NativeStatus::OPERATION_ABORTED);
        }
        let io = IoHandle::new();
        *lock(&self.last_write) = Some(io);
        trace!("request {}: send {} chunks {flags:?}", self.request_id, chunks.len());
        let result = self.transport.send(self.request_id, head, chunks, flags, io).await;
        lock(&self.last_write).take();
        result
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("request_id", &self.request_id)
            .field("connection_id", &self.connection_id)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

/// Run `fut`, aborting the request when `token` is cancelled first.
pub(crate) async fn cancellable<T, F>(shared: &Shared, token: &CancellationToken, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if token.is_cancelled() {
        shared.abort();
        return Err(Error::Canceled);
    }
    tokio::select! {
        result = fut => result,
        _ = token.cancelled() => {
            shared.abort();
            Err(Error::Canceled)
        }
    }
}
