use bytes::Bytes;
use std::path::Path;

use super::Response;
use super::buffer::BufferBuilder;
use super::chunked::{self, ChunkHeader};
use crate::cancel::CancellationToken;
use crate::context::cancellable;
use crate::error::{Error, UsageError};
use crate::http::BoundaryType;
use crate::io::Writable;
use crate::log::{debug, error, trace};
use crate::native::{DataChunk, NativeStatus, SendFlags};

/// Writes smaller than this are buffered while buffering is enabled.
pub const MAX_BUFFER_SIZE: usize = 4 * 1024;

/// Body write state of a [`Response`].
#[derive(Debug, Default)]
pub struct ResponseStream {
    pub(super) buffer: BufferBuilder,
    /// Body bytes still expected, `-1` when unbounded, `None` before framing is computed.
    pub(super) left_to_write: Option<i64>,
    pub(super) closed: bool,
    pub(super) opaque: bool,
}

impl ResponseStream {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Returns the number of buffered bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.total_bytes()
    }

    /// Returns body bytes still expected, `None` when unbounded or not yet known.
    #[inline]
    pub fn left_to_write(&self) -> Option<u64> {
        self.left_to_write.and_then(|left| u64::try_from(left).ok())
    }

    /// Returns `true` once the whole body has been handed to the listener.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub(super) fn reset(&mut self) {
        self.buffer.clear();
        self.left_to_write = None;
        self.closed = false;
    }

    pub(super) fn switch_to_opaque(&mut self) {
        self.opaque = true;
        self.left_to_write = Some(-1);
    }

    fn update_written(&mut self, count: u64) {
        if self.opaque {
            return;
        }
        if let Some(left) = &mut self.left_to_write {
            if *left > 0 {
                *left -= count.min(*left as u64) as i64;
            }
            if *left == 0 {
                self.closed = true;
            }
        }
    }
}

enum Payload<'a> {
    Borrowed(&'a [u8]),
    Shared(Bytes),
}

impl Payload<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Borrowed(data) => data.len(),
            Self::Shared(data) => data.len(),
        }
    }
}

/// Body writer of a [`Response`].
///
/// The first write starts the response. Small writes are buffered when
/// [`Response::should_buffer`] is set, larger ones are sent together with the buffer in a
/// single listener call without copying.
pub struct ResponseBody<'a> {
    response: &'a mut Response,
}

impl<'a> ResponseBody<'a> {
    pub(super) fn new(response: &'a mut Response) -> Self {
        Self { response }
    }

    #[inline]
    pub fn response(&self) -> &Response {
        self.response
    }

    #[inline]
    pub fn stream(&self) -> &ResponseStream {
        &self.response.stream
    }

    fn check_writable(&self) -> Result<(), Error> {
        match self.response.shared.is_aborted() {
            true => Err(Error::aborted()),
            false => Ok(()),
        }
    }

    /// Write `data`, copying it if it is buffered.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.write_payload(Payload::Borrowed(data)).await
    }

    /// Write a shared buffer, appended to the buffer without copying.
    pub async fn write_bytes(&mut self, data: Bytes) -> Result<(), Error> {
        self.write_payload(Payload::Shared(data)).await
    }

    pub async fn write_cancellable(&mut self, data: &[u8], token: &CancellationToken) -> Result<(), Error> {
        let shared = self.response.shared.clone();
        cancellable(&shared, token, self.write(data)).await
    }

    async fn write_payload(&mut self, data: Payload<'_>) -> Result<(), Error> {
        self.check_writable()?;
        let res = &mut *self.response;
        res.start();

        if !res.body_allowed() {
            trace!("request {}: discarding {} body bytes", res.shared.request_id, data.len());
            return Ok(());
        }

        let current = (res.stream.buffer.total_bytes() + data.len()) as u64;

        if !res.has_computed_headers() {
            if let Some(len) = res.content_length() {
                if len <= current {
                    if len < current {
                        return Err(UsageError::ContentLengthExceeded.into());
                    }
                    return self.flush_payload(data).await;
                }
            }
        } else if let Some(left) = res.stream.left_to_write {
            if left >= 0 && left as u64 <= current {
                if (left as u64) < current {
                    return Err(UsageError::ContentLengthExceeded.into());
                }
                return self.flush_payload(data).await;
            }
        }

        if res.should_buffer && current < MAX_BUFFER_SIZE as u64 {
            match data {
                Payload::Borrowed(data) => res.stream.buffer.copy_and_add(data),
                Payload::Shared(data) => res.stream.buffer.add(data),
            }
            return Ok(());
        }

        self.flush_payload(data).await
    }

    async fn flush_payload(&mut self, data: Payload<'_>) -> Result<(), Error> {
        match data {
            Payload::Borrowed(tail) => self.flush_internal(false, tail).await,
            Payload::Shared(data) => {
                self.response.stream.buffer.add(data);
                self.flush_internal(false, &[]).await
            }
        }
    }

    /// Send buffered data, the head is sent if it was not already.
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        self.response.start();
        self.flush_internal(false, &[]).await
    }

    pub async fn flush_cancellable(&mut self, token: &CancellationToken) -> Result<(), Error> {
        let shared = self.response.shared.clone();
        cancellable(&shared, token, self.flush()).await
    }

    /// Send buffered bytes followed by `tail` in one listener call.
    ///
    /// `end` marks the final send of the response.
    async fn flush_internal(&mut self, end: bool, tail: &[u8]) -> Result<(), Error> {
        let res = &mut *self.response;
        let started_sending = res.has_started_sending();
        let buffered = (res.stream.buffer.total_bytes() + tail.len()) as u64;
        if buffered == 0 && started_sending && !end {
            return Ok(());
        }

        let mut flags = res.compute_left_to_write(end, buffered)?;
        let body_allowed = res.body_allowed();
        let byte_count = if body_allowed { buffered } else { 0 };
        let left = res.stream.left_to_write.unwrap_or(-1);

        if !res.stream.opaque && end && left > byte_count as i64 {
            error!(
                "request {}: response body ended after {byte_count} bytes, {left} bytes were declared",
                res.shared.request_id
            );
            res.stream.buffer.clear();
            res.shared.abort();
            return Ok(());
        }

        if end && res.boundary == BoundaryType::Close {
            flags |= SendFlags::DISCONNECT;
        } else if !end && left != byte_count as i64 {
            flags |= SendFlags::MORE_DATA;
        }

        res.stream.update_written(byte_count);

        let head = match started_sending {
            true => None,
            false => Some(res.begin_send_head(false)?),
        };

        let header = ChunkHeader::new(byte_count);
        let mut payload = Vec::with_capacity(res.stream.buffer.buffer_count() + 1);
        if body_allowed {
            payload.extend(res.stream.buffer.segments().iter().map(|b| DataChunk::Memory(&b[..])));
            if !tail.is_empty() {
                payload.push(DataChunk::Memory(tail));
            }
        }
        let chunks = match body_allowed && res.boundary == BoundaryType::Chunked {
            true => chunked::frame(&header, payload, end),
            false => payload,
        };

        let result = res.shared.send(head.as_ref(), &chunks, flags).await;
        drop(chunks);
        res.stream.buffer.clear();
        res.check_send(result, end)
    }

    /// Send `count` bytes of the file at `path` starting at `offset`, `None` sends the rest of
    /// the file.
    ///
    /// Buffered data is flushed first. The file bytes are handed to the listener without being
    /// read into memory.
    pub async fn send_file(&mut self, path: impl AsRef<Path>, offset: u64, count: Option<u64>) -> Result<(), Error> {
        self.check_writable()?;
        self.response.start();

        let file = tokio::fs::File::open(path.as_ref()).await.map_err(Error::File)?;
        let file_len = file.metadata().await.map_err(Error::File)?.len();
        let count = match count {
            _ if offset > file_len => return Err(UsageError::InvalidFileRange.into()),
            Some(count) if count > file_len - offset => return Err(UsageError::InvalidFileRange.into()),
            Some(count) => count,
            None => file_len - offset,
        };
        let file = file.into_std().await;

        if !self.response.body_allowed() {
            return self.flush_internal(false, &[]).await;
        }
        if !self.response.stream.buffer.is_empty() {
            self.flush_internal(false, &[]).await?;
        }

        let res = &mut *self.response;
        let mut flags = res.compute_left_to_write(false, 0)?;
        let left = res.stream.left_to_write.unwrap_or(-1);
        if count == 0 && left != 0 {
            return Ok(());
        }
        if left >= 0 && count as i64 > left {
            return Err(UsageError::ContentLengthExceeded.into());
        }
        if left != count as i64 {
            flags |= SendFlags::MORE_DATA;
        }

        res.stream.update_written(count);

        let head = match res.has_started_sending() {
            true => None,
            false => Some(res.begin_send_head(false)?),
        };

        let header = ChunkHeader::new(count);
        let payload = vec![DataChunk::File { file: &file, offset, len: count }];
        let chunks = match res.boundary == BoundaryType::Chunked {
            true => chunked::frame(&header, payload, false),
            false => payload,
        };

        debug!("request {}: send file, {count} bytes at {offset}", res.shared.request_id);
        let result = res.shared.send(head.as_ref(), &chunks, flags).await;
        drop(chunks);
        res.check_send(result, false)
    }

    pub async fn send_file_cancellable(
        &mut self,
        path: impl AsRef<Path>,
        offset: u64,
        count: Option<u64>,
        token: &CancellationToken,
    ) -> Result<(), Error> {
        let shared = self.response.shared.clone();
        cancellable(&shared, token, self.send_file(path, offset, count)).await
    }

    /// Final flush of a disposed request.
    ///
    /// Failures are logged, the request is aborted instead of reporting them.
    pub(crate) async fn finish(&mut self) {
        let skip = self.response.stream.closed || self.response.shared.is_aborted();
        if !skip {
            self.response.start();
            if let Err(_err) = self.flush_internal(true, &[]).await {
                debug!("request {}: final flush failed: {_err}", self.response.shared.request_id);
            }
        }
        self.response.mark_closed();
    }
}

impl Response {
    /// Map a send outcome, failures abort the request.
    fn check_send(&self, result: Result<u64, NativeStatus>, end: bool) -> Result<(), Error> {
        let status = match result {
            Ok(_) | Err(NativeStatus::HANDLE_EOF) => return Ok(()),
            Err(status) => status,
        };
        if self.shared.is_aborted() {
            return Err(Error::aborted());
        }
        if end && status.is_graceful_disconnect() {
            debug!("request {}: client disconnected before the final send: {status}", self.shared.request_id);
            return Ok(());
        }

        error!("request {}: send failed: {status}", self.shared.request_id);
        self.shared.abort();
        match self.shared.options.ignore_write_errors {
            true => Ok(()),
            false => Err(Error::Io(status)),
        }
    }
}

impl Writable for ResponseBody<'_> {
    #[inline]
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), Error>> + Send {
        ResponseBody::write(self, data)
    }

    #[inline]
    fn flush(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        ResponseBody::flush(self)
    }
}

impl std::fmt::Debug for ResponseBody<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody").field("stream", &self.response.stream).finish()
    }
}
