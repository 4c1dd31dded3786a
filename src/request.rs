//! HTTP Request
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use crate::context::Shared;
use crate::error::{Error, UsageError};
use crate::headers::{HeaderCollection, contains_token, encoding, names};
use crate::http::{BoundaryType, Method, Version, parse_content_length};
use crate::native::{ClientCertificate, CookedUrl, RequestBlob, SslStatus};
use crate::uri;

mod stream;

pub use stream::{RequestBody, RequestStream};

/// Request properties the response needs for its framing decisions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RequestFacts {
    pub(crate) version: Version,
    pub(crate) is_head: bool,
    pub(crate) close_requested: bool,
}

/// A received HTTP request.
///
/// Method, target, and headers are decoded eagerly from the request blob. The body framing is
/// computed on first use, the body itself is read through [`Request::body`].
pub struct Request {
    shared: Arc<Shared>,
    method: Method,
    raw_method: String,
    raw_url: String,
    path_base: String,
    path: String,
    query: String,
    version: Version,
    headers: HeaderCollection,
    cooked_url: CookedUrl,
    ssl: SslStatus,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    framing: OnceLock<(BoundaryType, Option<u64>)>,
    certificate: Option<ClientCertificate>,
    max_request_body_size: Option<u64>,
    preloaded: Vec<Bytes>,
    stream: Option<RequestStream>,
}

impl Request {
    pub(crate) fn new(shared: Arc<Shared>, blob: RequestBlob) -> Self {
        let RequestBlob {
            request_id,
            method,
            raw_method,
            raw_url,
            version,
            headers,
            cooked_url,
            ssl,
            entity_chunks,
            ..
        } = blob;

        // `OPTIONS *` targets the server, not a resource
        let (path_base, path) = if method == Method::Options && &raw_url[..] == b"*" {
            (String::new(), String::new())
        } else {
            let decoded = uri::decode_path(uri::raw_path(&raw_url), &cooked_url.abs_path);
            let (base, path) = uri::split_path_base(&decoded, &shared.options.url_prefixes);
            (base.to_owned(), path.to_owned())
        };
        let query = encoding::decode(uri::raw_query(&raw_url)).into_owned();

        Self {
            local: shared.transport.local_endpoint(request_id),
            remote: shared.transport.remote_endpoint(request_id),
            max_request_body_size: shared.options.max_request_body_size,
            shared,
            method,
            raw_method,
            raw_url: encoding::decode(&raw_url).into_owned(),
            path_base,
            path,
            query,
            version,
            headers,
            cooked_url,
            ssl,
            framing: OnceLock::new(),
            certificate: None,
            preloaded: entity_chunks,
            stream: None,
        }
    }

    pub(crate) fn facts(&self) -> RequestFacts {
        let close_requested = self
            .headers
            .get(names::CONNECTION)
            .is_some_and(|v| contains_token(&v, "close"));
        RequestFacts {
            version: self.version,
            is_head: self.method.is_head(),
            close_requested,
        }
    }

    #[inline]
    pub fn request_id(&self) -> u64 {
        self.shared.request_id
    }

    #[inline]
    pub fn connection_id(&self) -> u64 {
        self.shared.connection_id
    }

    /// Returns the known method, [`Method::Unknown`] for extension methods.
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the method token exactly as sent.
    #[inline]
    pub fn raw_method(&self) -> &str {
        &self.raw_method
    }

    /// Returns the request target exactly as sent.
    #[inline]
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Returns the matched registered prefix, without its trailing slash.
    #[inline]
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    /// Returns the decoded path after [`path_base`](Request::path_base), `%2F` is kept encoded.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query including the leading `?`, or an empty string.
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    /// Returns the listener normalized URL.
    #[inline]
    pub fn cooked_url(&self) -> &CookedUrl {
        &self.cooked_url
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.cooked_url.host
    }

    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    #[inline]
    pub fn ssl_status(&self) -> SslStatus {
        self.ssl
    }

    #[inline]
    pub fn is_https(&self) -> bool {
        self.ssl != SslStatus::Insecure
    }

    #[inline]
    pub fn scheme(&self) -> &'static str {
        if self.is_https() { "https" } else { "http" }
    }

    fn framing(&self) -> (BoundaryType, Option<u64>) {
        *self.framing.get_or_init(|| {
            let chunked = self
                .headers
                .get(names::TRANSFER_ENCODING)
                .is_some_and(|v| v.rsplit(',').next().is_some_and(|e| e.trim().eq_ignore_ascii_case("chunked")));
            if chunked {
                return (BoundaryType::Chunked, None);
            }
            match self.headers.get(names::CONTENT_LENGTH) {
                Some(value) => match parse_content_length(&value) {
                    Some(len) => (BoundaryType::ContentLength, Some(len)),
                    None => (BoundaryType::Invalid, None),
                },
                None => (BoundaryType::None, None),
            }
        })
    }

    /// Returns how the request body is delimited.
    #[inline]
    pub fn body_boundary(&self) -> BoundaryType {
        self.framing().0
    }

    /// Returns the parsed `Content-Length`, `None` if absent, invalid, or chunked.
    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.framing().1
    }

    /// Returns `true` if the request declares a body.
    pub fn has_entity_body(&self) -> bool {
        match self.framing() {
            (BoundaryType::Chunked, _) => true,
            (BoundaryType::ContentLength, Some(len)) => len > 0,
            _ => false,
        }
    }

    /// Returns `true` if the request may be switched into an opaque stream.
    pub fn is_upgradable(&self) -> bool {
        self.body_boundary() == BoundaryType::None && self.shared.transport.supports_opaque()
    }

    /// Returns the client certificate of a TLS connection, loaded once.
    pub async fn client_certificate(&mut self) -> Result<Option<ClientCertificate>, Error> {
        if !self.is_https() {
            return Ok(None);
        }
        if let Some(certificate) = &self.certificate {
            return Ok(Some(certificate.clone()));
        }
        let certificate = self
            .shared
            .transport
            .load_client_certificate(self.shared.connection_id)
            .await?;
        self.certificate.clone_from(&certificate);
        Ok(certificate)
    }

    #[inline]
    pub fn max_request_body_size(&self) -> Option<u64> {
        self.max_request_body_size
    }

    /// Change the body limit of this request, `None` for unlimited.
    ///
    /// Fails once body reading has started.
    pub fn set_max_request_body_size(&mut self, limit: Option<u64>) -> Result<(), Error> {
        if self.has_request_body_started() {
            return Err(UsageError::BodyAlreadyStarted.into());
        }
        self.max_request_body_size = limit;
        if let Some(stream) = &mut self.stream {
            stream.set_limit(limit);
        }
        Ok(())
    }

    #[inline]
    pub fn has_request_body_started(&self) -> bool {
        self.stream.as_ref().is_some_and(RequestStream::has_started)
    }

    /// Returns the request body.
    ///
    /// Requests without a declared body return [`RequestBody::Empty`].
    pub fn body(&mut self) -> RequestBody<'_> {
        if self.stream.is_none() && !self.has_entity_body() {
            return RequestBody::Empty;
        }
        RequestBody::Stream(self.stream())
    }

    fn stream(&mut self) -> &mut RequestStream {
        let content_length = self.content_length();
        let Self { stream, shared, preloaded, max_request_body_size, .. } = self;
        stream.get_or_insert_with(|| {
            RequestStream::new(
                shared.clone(),
                std::mem::take(preloaded),
                *max_request_body_size,
                content_length,
            )
        })
    }

    pub(crate) fn switch_to_opaque_mode(&mut self) -> &mut RequestStream {
        let stream = self.stream();
        stream.switch_to_opaque();
        stream
    }

    pub(crate) fn dispose(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.close();
        }
        self.preloaded.clear();
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.shared.request_id)
            .field("method", &self.raw_method)
            .field("raw_url", &self.raw_url)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
