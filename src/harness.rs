//! Shared fixtures of the pipeline tests.
use std::sync::Arc;

use crate::native::MemoryTransport;
use crate::native::memory::{MemoryRequest, SentFrame};
use crate::{Options, RequestContext, Server};

pub(crate) struct Harness {
    pub(crate) transport: Arc<MemoryTransport>,
    pub(crate) server: Server,
}

impl Harness {
    pub(crate) fn new(options: Options) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        let server = Server::new(transport.clone(), options);
        Self { transport, server }
    }

    /// Queue `request` and accept it.
    pub(crate) async fn request(&self, request: MemoryRequest) -> RequestContext {
        self.transport.push(request);
        self.server.accept().await.unwrap()
    }

    pub(crate) async fn get(&self, target: &str) -> RequestContext {
        self.request(MemoryRequest::new(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n"))).await
    }

    pub(crate) fn sends(&self, request_id: u64) -> Vec<SentFrame> {
        self.transport.sends(request_id)
    }

    /// Concatenated body bytes of every send.
    pub(crate) fn body(&self, request_id: u64) -> Vec<u8> {
        self.sends(request_id).into_iter().flat_map(|f| f.data).collect()
    }
}
