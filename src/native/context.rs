use bytes::Bytes;

use super::parser::{self, ParseError};
use super::{CookedUrl, IoHandle, ReceiveInfo, SslStatus};
use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::http::{Method, Version};
use crate::log::trace;

const ALIGNMENT: usize = 8;

/// Owner of the receive buffer the listener writes a request blob into.
///
/// The buffer window returned by [`buffer_mut`] starts on an 8 byte boundary. The context is
/// consumed by [`release_pins`], after which the blob is only reachable through the returned
/// [`RequestBlob`].
///
/// [`buffer_mut`]: NativeRequestContext::buffer_mut
/// [`release_pins`]: NativeRequestContext::release_pins
#[derive(Debug)]
pub struct NativeRequestContext {
    buffer: Vec<u8>,
    padding: usize,
    size: usize,
    request_id: u64,
    io: IoHandle,
}

impl NativeRequestContext {
    /// Default buffer size when no size hint is given.
    pub const DEFAULT_SIZE: usize = 4096;

    /// Allocate a context for receiving `request_id`, `0` for a new request.
    pub fn new(request_id: u64, size_hint: usize) -> Result<Self, Error> {
        let mut me = Self {
            buffer: Vec::new(),
            padding: 0,
            size: 0,
            request_id,
            io: IoHandle::new(),
        };
        me.reset(request_id, size_hint)?;
        Ok(me)
    }

    /// Prepare the context for another receive attempt.
    ///
    /// The buffer is reallocated when it cannot hold `size_hint` bytes, and the completion
    /// handle is always replaced.
    pub fn reset(&mut self, request_id: u64, size_hint: usize) -> Result<(), Error> {
        let size = match size_hint {
            0 => Self::DEFAULT_SIZE,
            n => n,
        };

        if self.buffer.len() < size + ALIGNMENT {
            let mut buffer = Vec::new();
            buffer.try_reserve_exact(size + ALIGNMENT).map_err(|_| Error::Alloc)?;
            buffer.resize(size + ALIGNMENT, 0);
            self.buffer = buffer;
        }

        self.padding = match self.buffer.as_ptr().align_offset(ALIGNMENT) {
            n if n < ALIGNMENT => n,
            _ => 0,
        };
        self.size = size;
        self.request_id = request_id;

        let old = std::mem::replace(&mut self.io, IoHandle::new());
        trace!("request {request_id}: replaced completion handle {}", old.id());
        Ok(())
    }

    #[inline]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Returns the usable buffer size.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn io_handle(&self) -> IoHandle {
        self.io
    }

    /// Returns the aligned receive window.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.padding..self.padding + self.size]
    }

    /// Consume the context and copy out the request described by `info`.
    ///
    /// Preloaded entity chunks share the receive buffer without copying.
    pub fn release_pins(self, info: ReceiveInfo) -> Result<RequestBlob, ParseError> {
        let Self { buffer, padding, size, .. } = self;
        let mut blob = Bytes::from(buffer).slice(padding..padding + size);

        if info.head_len > blob.len() {
            return Err(ParseError::Incomplete);
        }
        let head = parser::parse_head(&blob.split_to(info.head_len))?;

        let mut entity_chunks = Vec::with_capacity(info.entity_chunks.len());
        for len in info.entity_chunks {
            if len > blob.len() {
                return Err(ParseError::Incomplete);
            }
            entity_chunks.push(blob.split_to(len));
        }

        Ok(RequestBlob {
            request_id: info.request_id,
            connection_id: info.connection_id,
            method: head.method,
            raw_method: head.raw_method,
            raw_url: head.target,
            version: head.version,
            headers: head.headers,
            cooked_url: info.cooked_url,
            ssl: info.ssl,
            entity_chunks,
        })
    }
}

/// A received request, detached from the native receive buffer.
#[derive(Debug, Clone)]
pub struct RequestBlob {
    pub request_id: u64,
    pub connection_id: u64,
    pub method: Method,
    pub raw_method: String,
    /// Request target exactly as sent by the client.
    pub raw_url: Bytes,
    pub version: Version,
    pub headers: HeaderCollection,
    pub cooked_url: CookedUrl,
    pub ssl: SslStatus,
    /// Entity body bytes received together with the head.
    pub entity_chunks: Vec<Bytes>,
}
