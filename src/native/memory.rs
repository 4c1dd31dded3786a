//! In-process listener.
//!
//! [`MemoryTransport`] implements [`Transport`] over queued request blobs and records every
//! send, so the pipeline can run without a kernel listener.
use bytes::{Buf, Bytes, BytesMut};
use futures_core::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::{
    ClientCertificate, CookedUrl, DataChunk, IoHandle, NativeStatus, ReceiveInfo, Received,
    ResponseHead, SendFlags, SslStatus, Transport,
};

/// A request waiting to be received from a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryRequest {
    connection_id: Option<u64>,
    head: Vec<u8>,
    preload: Vec<Bytes>,
    body: Vec<Bytes>,
    eof: bool,
    ssl: SslStatus,
    remote: Option<SocketAddr>,
}

impl MemoryRequest {
    /// Create a request from its raw head, including the terminating empty line.
    pub fn new(head: impl AsRef<[u8]>) -> Self {
        Self {
            connection_id: None,
            head: head.as_ref().to_vec(),
            preload: Vec::new(),
            body: Vec::new(),
            eof: true,
            ssl: SslStatus::Insecure,
            remote: None,
        }
    }

    /// Deliver the request on an existing connection.
    pub fn connection(mut self, connection_id: u64) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    /// Body bytes delivered together with the head.
    pub fn preload(mut self, chunk: impl Into<Bytes>) -> Self {
        self.preload.push(chunk.into());
        self
    }

    /// Body bytes delivered by later entity body receives.
    pub fn body(mut self, chunk: impl Into<Bytes>) -> Self {
        self.body.push(chunk.into());
        self
    }

    /// Keep the body open, more can be pushed with [`MemoryTransport::push_body`].
    pub fn streaming(mut self) -> Self {
        self.eof = false;
        self
    }

    pub fn ssl(mut self, ssl: SslStatus) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn remote(mut self, addr: SocketAddr) -> Self {
        self.remote = Some(addr);
        self
    }
}

/// A recorded send call.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub head: Option<ResponseHead>,
    pub data: Vec<u8>,
    pub flags: SendFlags,
}

/// In-process [`Transport`].
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Debug)]
struct State {
    next_request_id: u64,
    next_connection_id: u64,
    queue: VecDeque<Queued>,
    requests: HashMap<u64, RequestState>,
    cancelled_io: HashSet<IoHandle>,
    disconnected: HashSet<u64>,
    certificates: HashMap<u64, ClientCertificate>,
    certificate_loads: usize,
    fail_sends: Option<NativeStatus>,
    hold_sends: bool,
    in_flight_sends: usize,
    supports_opaque: bool,
    closed: bool,
}

#[derive(Debug)]
struct Queued {
    request_id: Option<u64>,
    connection_id: u64,
    request: MemoryRequest,
}

#[derive(Debug)]
struct RequestState {
    connection_id: u64,
    body: VecDeque<Bytes>,
    eof: bool,
    cancelled: bool,
    completed: bool,
    remote: SocketAddr,
    sends: Vec<SentFrame>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_request_id: 1,
                next_connection_id: 1,
                queue: VecDeque::new(),
                requests: HashMap::new(),
                cancelled_io: HashSet::new(),
                disconnected: HashSet::new(),
                certificates: HashMap::new(),
                certificate_loads: 0,
                fail_sends: None,
                hold_sends: false,
                in_flight_sends: 0,
                supports_opaque: true,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let result = f(&mut self.lock());
        self.notify.notify_waiters();
        result
    }

    /// Queue a request, returns its connection id.
    pub fn push(&self, request: MemoryRequest) -> u64 {
        self.update(|state| {
            let connection_id = request.connection_id.unwrap_or_else(|| {
                let id = state.next_connection_id;
                state.next_connection_id += 1;
                id
            });
            state.next_connection_id = state.next_connection_id.max(connection_id + 1);
            state.queue.push_back(Queued { request_id: None, connection_id, request });
            connection_id
        })
    }

    /// Append body bytes to a received streaming request.
    pub fn push_body(&self, request_id: u64, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        self.update(|state| {
            if let Some(req) = state.requests.get_mut(&request_id) {
                if !chunk.is_empty() {
                    req.body.push_back(chunk);
                }
            }
        })
    }

    /// End the body of a streaming request.
    pub fn finish_body(&self, request_id: u64) {
        self.update(|state| {
            if let Some(req) = state.requests.get_mut(&request_id) {
                req.eof = true;
            }
        })
    }

    /// Simulate the peer closing a connection.
    pub fn disconnect(&self, connection_id: u64) {
        self.update(|state| {
            state.disconnected.insert(connection_id);
        })
    }

    /// Stop the listener, pending and later receives fail.
    pub fn close(&self) {
        self.update(|state| state.closed = true)
    }

    pub fn set_certificate(&self, connection_id: u64, certificate: ClientCertificate) {
        self.update(|state| {
            state.certificates.insert(connection_id, certificate);
        })
    }

    /// Number of client certificate loads issued so far.
    pub fn certificate_loads(&self) -> usize {
        self.lock().certificate_loads
    }

    /// Fail every following send with `status`, `None` to recover.
    pub fn fail_sends(&self, status: Option<NativeStatus>) {
        self.update(|state| state.fail_sends = status)
    }

    /// Keep sends pending until released or cancelled.
    pub fn hold_sends(&self, hold: bool) {
        self.update(|state| state.hold_sends = hold)
    }

    /// Number of sends currently pending.
    pub fn in_flight_sends(&self) -> usize {
        self.lock().in_flight_sends
    }

    pub fn set_supports_opaque(&self, supported: bool) {
        self.update(|state| state.supports_opaque = supported)
    }

    /// Returns `true` if the request was cancelled with [`Transport::cancel_request`].
    pub fn is_cancelled(&self, request_id: u64) -> bool {
        self.lock().requests.get(&request_id).is_some_and(|r| r.cancelled)
    }

    /// Returns the sends recorded for a request.
    pub fn sends(&self, request_id: u64) -> Vec<SentFrame> {
        self.lock().requests.get(&request_id).map(|r| r.sends.clone()).unwrap_or_default()
    }

    /// Render the recorded sends of a request as HTTP/1.1 bytes.
    pub fn response_bytes(&self, request_id: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in self.sends(request_id) {
            if let Some(head) = &frame.head {
                head.encode(&mut buf);
            }
            buf.extend_from_slice(&frame.data);
        }
        buf.to_vec()
    }
}

impl Default for MemoryTransport {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn receive_request<'a>(
        &'a self,
        request_id: u64,
        buffer: &'a mut [u8],
        io: IoHandle,
    ) -> BoxFuture<'a, Result<Received, NativeStatus>> {
        Box::pin(async move {
            loop {
                let notified = self.notify.notified();
                {
                    let mut state = self.lock();
                    let state = &mut *state;
                    if state.cancelled_io.remove(&io) || state.closed {
                        return Err(NativeStatus::OPERATION_ABORTED);
                    }

                    let pos = match request_id {
                        0 => state.queue.iter().position(|q| q.request_id.is_none()),
                        id => match state.queue.iter().position(|q| q.request_id == Some(id)) {
                            Some(pos) => Some(pos),
                            None => return Err(NativeStatus::CONNECTION_INVALID),
                        },
                    };

                    if let Some(pos) = pos {
                        let queued = &mut state.queue[pos];
                        let id = match queued.request_id {
                            Some(id) => id,
                            None => {
                                let id = state.next_request_id;
                                state.next_request_id += 1;
                                queued.request_id = Some(id);
                                id
                            }
                        };

                        let req = &queued.request;
                        let head_len = req.head.len();
                        let required = head_len + req.preload.iter().map(Bytes::len).sum::<usize>();
                        if required > buffer.len() {
                            return Ok(Received::MoreData { request_id: id, required });
                        }

                        let Some(Queued { connection_id, request, .. }) = state.queue.remove(pos) else {
                            continue;
                        };
                        return Ok(Received::Complete(accept(state, buffer, id, connection_id, request)));
                    }
                }
                notified.await;
            }
        })
    }

    fn receive_entity_body<'a>(
        &'a self,
        request_id: u64,
        buffer: &'a mut [u8],
        io: IoHandle,
    ) -> BoxFuture<'a, Result<usize, NativeStatus>> {
        Box::pin(async move {
            loop {
                let notified = self.notify.notified();
                {
                    let mut state = self.lock();
                    if state.cancelled_io.remove(&io) {
                        return Err(NativeStatus::OPERATION_ABORTED);
                    }
                    let Some(req) = state.requests.get_mut(&request_id) else {
                        return Err(NativeStatus::CONNECTION_INVALID);
                    };
                    if req.cancelled {
                        return Err(NativeStatus::OPERATION_ABORTED);
                    }
                    if let Some(front) = req.body.front_mut() {
                        let n = front.len().min(buffer.len());
                        buffer[..n].copy_from_slice(&front[..n]);
                        front.advance(n);
                        if front.is_empty() {
                            req.body.pop_front();
                        }
                        return Ok(n);
                    }
                    if req.eof {
                        return Err(NativeStatus::HANDLE_EOF);
                    }
                }
                notified.await;
            }
        })
    }

    fn send<'a>(
        &'a self,
        request_id: u64,
        head: Option<&'a ResponseHead>,
        chunks: &'a [DataChunk<'a>],
        flags: SendFlags,
        io: IoHandle,
    ) -> BoxFuture<'a, Result<u64, NativeStatus>> {
        Box::pin(async move {
            let mut data = Vec::new();
            for chunk in chunks {
                match chunk {
                    DataChunk::Memory(buf) => data.extend_from_slice(buf),
                    DataChunk::File { file, offset, len } => {
                        read_range(file, *offset, *len, &mut data)
                            .map_err(|_| NativeStatus::INVALID_PARAMETER)?;
                    }
                }
            }

            let mut counted = false;
            let result = loop {
                let notified = self.notify.notified();
                {
                    let mut state = self.lock();
                    let state = &mut *state;
                    if state.cancelled_io.remove(&io) {
                        break Err(NativeStatus::OPERATION_ABORTED);
                    }
                    let Some(req) = state.requests.get_mut(&request_id) else {
                        break Err(NativeStatus::CONNECTION_INVALID);
                    };
                    if req.cancelled {
                        break Err(NativeStatus::OPERATION_ABORTED);
                    }
                    if state.disconnected.contains(&req.connection_id) {
                        break Err(NativeStatus::CONNECTION_INVALID);
                    }
                    if !flags.contains(SendFlags::MORE_DATA) {
                        req.completed = true;
                    }
                    if !state.hold_sends {
                        if let Some(status) = state.fail_sends {
                            break Err(status);
                        }
                        let len = data.len() as u64;
                        req.sends.push(SentFrame { head: head.cloned(), data, flags });
                        break Ok(len);
                    }
                    if !counted {
                        state.in_flight_sends += 1;
                        counted = true;
                    }
                }
                notified.await;
            };

            if counted {
                self.lock().in_flight_sends -= 1;
            }
            result
        })
    }

    fn cancel_request(&self, request_id: u64) -> Result<(), NativeStatus> {
        self.update(|state| {
            let Some(req) = state.requests.get_mut(&request_id) else {
                return Err(NativeStatus::CONNECTION_INVALID);
            };
            if req.completed {
                return Err(NativeStatus::CONNECTION_INVALID);
            }
            req.cancelled = true;
            Ok(())
        })
    }

    fn cancel_pending_io(&self, io: IoHandle) -> Result<(), NativeStatus> {
        self.update(|state| {
            state.cancelled_io.insert(io);
        });
        Ok(())
    }

    fn local_endpoint(&self, request_id: u64) -> Option<SocketAddr> {
        self.lock()
            .requests
            .contains_key(&request_id)
            .then(|| SocketAddr::from((Ipv4Addr::LOCALHOST, 80)))
    }

    fn remote_endpoint(&self, request_id: u64) -> Option<SocketAddr> {
        self.lock().requests.get(&request_id).map(|r| r.remote)
    }

    fn load_client_certificate(
        &self,
        connection_id: u64,
    ) -> BoxFuture<'_, Result<Option<ClientCertificate>, NativeStatus>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.certificate_loads += 1;
            Ok(state.certificates.get(&connection_id).cloned())
        })
    }

    fn wait_for_disconnect(&self, connection_id: u64) -> BoxFuture<'_, Result<(), NativeStatus>> {
        Box::pin(async move {
            loop {
                let notified = self.notify.notified();
                {
                    let state = self.lock();
                    if state.disconnected.contains(&connection_id) {
                        return Ok(());
                    }
                    if state.closed {
                        return Err(NativeStatus::OPERATION_ABORTED);
                    }
                }
                notified.await;
            }
        })
    }

    fn supports_opaque(&self) -> bool {
        self.lock().supports_opaque
    }
}

fn accept(
    state: &mut State,
    buffer: &mut [u8],
    request_id: u64,
    connection_id: u64,
    request: MemoryRequest,
) -> ReceiveInfo {
    let head_len = request.head.len();
    buffer[..head_len].copy_from_slice(&request.head);

    let mut offset = head_len;
    let mut entity_chunks = Vec::with_capacity(request.preload.len());
    for chunk in &request.preload {
        buffer[offset..offset + chunk.len()].copy_from_slice(chunk);
        offset += chunk.len();
        entity_chunks.push(chunk.len());
    }

    let remote = request
        .remote
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, 50000 + (connection_id % 10000) as u16)));

    state.requests.insert(request_id, RequestState {
        connection_id,
        body: request.body.into_iter().filter(|b| !b.is_empty()).collect(),
        eof: request.eof,
        cancelled: false,
        completed: false,
        remote,
        sends: Vec::new(),
    });

    ReceiveInfo {
        request_id,
        connection_id,
        head_len,
        entity_chunks,
        cooked_url: cook(&request.head),
        ssl: request.ssl,
    }
}

/// Normalize the request target the way the listener does: fully decoded path, raw query.
fn cook(head: &[u8]) -> CookedUrl {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines();
    let target = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .unwrap_or_default();
    let host = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("host"))
        .map(|(_, value)| value.trim().to_owned())
        .unwrap_or_default();

    let path_and_query = match target.find("://") {
        Some(scheme) => match target[scheme + 3..].find('/') {
            Some(slash) => &target[scheme + 3 + slash..],
            None => "",
        },
        None if target.starts_with('/') => target,
        None => "",
    };
    let (path, query) = match path_and_query.find('?') {
        Some(q) => (&path_and_query[..q], &path_and_query[q..]),
        None => (path_and_query, ""),
    };

    CookedUrl {
        host,
        abs_path: if path.is_empty() { "/".to_owned() } else { percent_decode_lossy(path) },
        query: query.to_owned(),
    }
}

fn percent_decode_lossy(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes.get(i + 1..i + 3).and_then(|h| str::from_utf8(h).ok());
        match (bytes[i], hex.and_then(|h| u8::from_str_radix(h, 16).ok())) {
            (b'%', Some(octet)) => {
                out.push(octet);
                i += 3;
            }
            (b, _) => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn read_range(mut file: &std::fs::File, offset: u64, len: u64, out: &mut Vec<u8>) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    let read = file.take(len).read_to_end(out)?;
    if read as u64 != len {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}
