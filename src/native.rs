//! Boundary to the kernel-mode HTTP listener.
//!
//! The listener accepts connections, terminates TLS, and hands each request to user mode as a
//! raw blob: an HTTP/1.x request head followed by any entity body bytes it already buffered.
//! [`Transport`] is the set of listener calls the pipeline issues, every call that may
//! complete asynchronously carries an [`IoHandle`] which can later be cancelled.
use bytes::Bytes;
use futures_core::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

mod context;
mod parser;
mod wire;
pub mod memory;

pub use context::{NativeRequestContext, RequestBlob};
pub use parser::ParseError;
pub use wire::{MultipleKnownHeaders, ResponseHead};
pub use memory::MemoryTransport;

/// Kernel-mode listener operations.
pub trait Transport: Send + Sync + 'static {
    /// Receive the next request into `buffer`.
    ///
    /// `request_id` is `0` for a new request, or the id reported by a previous
    /// [`Received::MoreData`] when retrying with a larger buffer.
    fn receive_request<'a>(
        &'a self,
        request_id: u64,
        buffer: &'a mut [u8],
        io: IoHandle,
    ) -> BoxFuture<'a, Result<Received, NativeStatus>>;

    /// Receive entity body bytes that were not preloaded with the request.
    ///
    /// The listener removes transfer codings, `Ok(0)` or [`NativeStatus::HANDLE_EOF`] marks
    /// the end of the body.
    fn receive_entity_body<'a>(
        &'a self,
        request_id: u64,
        buffer: &'a mut [u8],
        io: IoHandle,
    ) -> BoxFuture<'a, Result<usize, NativeStatus>>;

    /// Send response data, with the response head on the first call for a request.
    ///
    /// Returns the number of bytes sent.
    fn send<'a>(
        &'a self,
        request_id: u64,
        head: Option<&'a ResponseHead>,
        chunks: &'a [DataChunk<'a>],
        flags: SendFlags,
        io: IoHandle,
    ) -> BoxFuture<'a, Result<u64, NativeStatus>>;

    /// Cancel every pending operation of a request and reset it.
    ///
    /// Fails with [`NativeStatus::CONNECTION_INVALID`] once the final send of the request
    /// has been issued.
    fn cancel_request(&self, request_id: u64) -> Result<(), NativeStatus>;

    /// Cancel a single pending operation.
    fn cancel_pending_io(&self, io: IoHandle) -> Result<(), NativeStatus>;

    fn local_endpoint(&self, request_id: u64) -> Option<SocketAddr>;

    fn remote_endpoint(&self, request_id: u64) -> Option<SocketAddr>;

    /// Load the client certificate negotiated on a TLS connection.
    fn load_client_certificate(
        &self,
        connection_id: u64,
    ) -> BoxFuture<'_, Result<Option<ClientCertificate>, NativeStatus>>;

    /// Completes when the connection is closed by the peer.
    fn wait_for_disconnect(&self, connection_id: u64) -> BoxFuture<'_, Result<(), NativeStatus>>;

    /// Returns `true` if the listener can switch a request into a duplex opaque stream.
    fn supports_opaque(&self) -> bool {
        true
    }
}

/// Outcome of [`Transport::receive_request`].
#[derive(Debug)]
pub enum Received {
    /// The whole request head and preloaded body fit in the buffer.
    Complete(ReceiveInfo),
    /// The buffer is too small, retry the same request with at least `required` bytes.
    MoreData { request_id: u64, required: usize },
}

/// Metadata of a received request blob.
#[derive(Debug, Clone, Default)]
pub struct ReceiveInfo {
    pub request_id: u64,
    pub connection_id: u64,
    /// Length of the request head at the start of the buffer.
    pub head_len: usize,
    /// Lengths of the preloaded entity body chunks following the head.
    pub entity_chunks: Vec<usize>,
    /// Listener normalized URL.
    pub cooked_url: CookedUrl,
    pub ssl: SslStatus,
}

/// URL as normalized and fully decoded by the listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookedUrl {
    pub host: String,
    pub abs_path: String,
    pub query: String,
}

/// TLS state of the connection a request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslStatus {
    #[default]
    Insecure,
    NoClientCert,
    ClientCert,
}

/// Client certificate as delivered by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// DER encoded certificate.
    pub der: Bytes,
    /// Listener certificate verification flags.
    pub flags: u32,
}

/// A scatter-gather element of a send call.
#[derive(Debug, Clone, Copy)]
pub enum DataChunk<'a> {
    Memory(&'a [u8]),
    File { file: &'a std::fs::File, offset: u64, len: u64 },
}

impl DataChunk<'_> {
    /// Returns the number of bytes this chunk contributes.
    #[inline]
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(buf) => buf.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ===== IoHandle =====

/// Identifies one asynchronous listener operation for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IoHandle(u64);

impl IoHandle {
    /// Allocate a process unique handle.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl Default for IoHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// ===== SendFlags =====

/// Flags of a [`Transport::send`] call.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SendFlags(u32);

impl SendFlags {
    pub const NONE: Self = Self(0);
    /// Close the connection after the send completes.
    pub const DISCONNECT: Self = Self(0x1);
    /// More data follows in a later send.
    pub const MORE_DATA: Self = Self(0x2);
    /// Let the listener coalesce this send with the next one.
    pub const BUFFER_DATA: Self = Self(0x4);
    /// Switch the request into an opaque duplex stream.
    pub const OPAQUE: Self = Self(0x40);

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for SendFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SendFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for SendFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(SendFlags, &str); 4] = [
            (SendFlags::DISCONNECT, "DISCONNECT"),
            (SendFlags::MORE_DATA, "MORE_DATA"),
            (SendFlags::BUFFER_DATA, "BUFFER_DATA"),
            (SendFlags::OPAQUE, "OPAQUE"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

// ===== NativeStatus =====

/// Status code returned by a failed listener call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeStatus(u32);

macro_rules! status {
    ($($(#[$doc:meta])* $id:ident = $code:literal;)*) => {
        impl NativeStatus {
            $(
                $(#[$doc])*
                pub const $id: Self = Self($code);
            )*

            fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some(stringify!($id)),)*
                    _ => None,
                }
            }
        }
    };
}

status! {
    SUCCESS = 0;
    /// End of the entity body, or the request was already completed.
    HANDLE_EOF = 38;
    NOT_SUPPORTED = 50;
    /// Commonly returned when the request has already been completed.
    INVALID_PARAMETER = 87;
    /// The receive buffer was too small.
    MORE_DATA = 234;
    /// The operation was cancelled.
    OPERATION_ABORTED = 995;
    IO_PENDING = 997;
    NOT_FOUND = 1168;
    /// The connection was closed or the request id is no longer valid.
    CONNECTION_INVALID = 1229;
}

impl NativeStatus {
    #[inline]
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn code(&self) -> u32 {
        self.0
    }

    /// Returns `true` for statuses that mean the peer went away after the response was
    /// already complete.
    #[inline]
    pub const fn is_graceful_disconnect(&self) -> bool {
        matches!(*self, Self::CONNECTION_INVALID | Self::INVALID_PARAMETER)
    }
}

impl std::fmt::Debug for NativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "error {}", self.0),
        }
    }
}
