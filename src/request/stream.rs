use bytes::Bytes;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::context::{Shared, cancellable};
use crate::error::Error;
use crate::io::Readable;
use crate::log::{debug, trace};
use crate::native::NativeStatus;

/// Upper bound of a single native body receive.
pub const MAX_READ_SIZE: usize = 128 * 1024;

/// Request entity body reader.
///
/// Bytes preloaded together with the request head are served first, the rest is received from
/// the listener. Reads are sequential, at most one native receive is in flight.
pub struct RequestStream {
    shared: Arc<Shared>,
    preloaded: Vec<Bytes>,
    chunk_index: usize,
    chunk_offset: usize,
    closed: bool,
    started: bool,
    total_read: u64,
    limit: Option<u64>,
    content_length: Option<u64>,
}

impl RequestStream {
    pub(crate) fn new(
        shared: Arc<Shared>,
        preloaded: Vec<Bytes>,
        limit: Option<u64>,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            shared,
            preloaded,
            chunk_index: 0,
            chunk_offset: 0,
            closed: false,
            started: false,
            total_read: 0,
            limit,
            content_length,
        }
    }

    /// Returns `true` once the end of the body was observed or the request was disposed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the number of body bytes read so far.
    #[inline]
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    #[inline]
    pub(crate) fn has_started(&self) -> bool {
        self.started
    }

    pub(crate) fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Opaque streams carry arbitrary protocol bytes, no body limit applies.
    pub(crate) fn switch_to_opaque(&mut self) {
        self.limit = None;
        self.content_length = None;
        self.closed = false;
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    fn has_preloaded(&self) -> bool {
        self.chunk_index < self.preloaded.len()
    }

    fn copy_preloaded(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() && self.has_preloaded() {
            let chunk = &self.preloaded[self.chunk_index][self.chunk_offset..];
            let n = chunk.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&chunk[..n]);
            copied += n;

            if n == chunk.len() {
                self.chunk_index += 1;
                self.chunk_offset = 0;
            } else {
                self.chunk_offset += n;
            }
        }
        if !self.has_preloaded() {
            self.preloaded = Vec::new();
            self.chunk_index = 0;
        }
        copied
    }

    fn check_limit(&mut self, read: usize) -> Result<usize, Error> {
        self.total_read += read as u64;
        match self.limit {
            Some(limit) if self.total_read > limit => Err(Error::RequestBodyTooLarge),
            _ => Ok(read),
        }
    }

    /// Read body bytes into `buf`, `Ok(0)` marks the end of the body.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.shared.is_aborted() {
            return Err(Error::aborted());
        }
        if self.closed || buf.is_empty() {
            return Ok(0);
        }

        self.started = true;
        if let (Some(limit), Some(len)) = (self.limit, self.content_length) {
            if len > limit {
                debug!("request {}: content length {len} exceeds limit {limit}", self.shared.request_id);
                return Err(Error::RequestBodyTooLarge);
            }
        }

        if self.has_preloaded() {
            let read = self.copy_preloaded(buf);
            return self.check_limit(read);
        }

        let size = buf.len().min(MAX_READ_SIZE);
        match self.shared.receive_body(&mut buf[..size]).await {
            Ok(0) | Err(NativeStatus::HANDLE_EOF) => {
                trace!("request {}: end of body", self.shared.request_id);
                self.closed = true;
                Ok(0)
            }
            Ok(read) => self.check_limit(read),
            Err(_) if self.shared.is_aborted() => Err(Error::aborted()),
            Err(status) => {
                debug!("request {}: body receive failed: {status}", self.shared.request_id);
                self.shared.abort();
                Err(Error::Io(status))
            }
        }
    }

    /// Like [`read`](RequestStream::read), aborting the request when `token` is cancelled.
    pub async fn read_cancellable(&mut self, buf: &mut [u8], token: &CancellationToken) -> Result<usize, Error> {
        let shared = self.shared.clone();
        cancellable(&shared, token, self.read(buf)).await
    }
}

impl Readable for RequestStream {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Error>> + Send {
        RequestStream::read(self, buf)
    }
}

impl std::fmt::Debug for RequestStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStream")
            .field("closed", &self.closed)
            .field("total_read", &self.total_read)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Body of a [`Request`](super::Request).
#[derive(Debug)]
pub enum RequestBody<'a> {
    /// The request declares no body.
    Empty,
    Stream(&'a mut RequestStream),
}

impl RequestBody<'_> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            Self::Empty => Ok(0),
            Self::Stream(stream) => stream.read(buf).await,
        }
    }

    pub async fn read_cancellable(&mut self, buf: &mut [u8], token: &CancellationToken) -> Result<usize, Error> {
        match self {
            Self::Empty => Ok(0),
            Self::Stream(stream) => stream.read_cancellable(buf, token).await,
        }
    }
}

impl Readable for RequestBody<'_> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Error>> + Send {
        RequestBody::read(self, buf)
    }
}
