/// Response headers the listener stores in its fixed known-header table.
///
/// The discriminant is the table index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KnownHeader {
    CacheControl = 0,
    Connection,
    Date,
    KeepAlive,
    Pragma,
    Trailer,
    TransferEncoding,
    Upgrade,
    Via,
    Warning,
    Allow,
    ContentLength,
    ContentType,
    ContentEncoding,
    ContentLanguage,
    ContentLocation,
    ContentMd5,
    ContentRange,
    Expires,
    LastModified,
    AcceptRanges,
    Age,
    ETag,
    Location,
    ProxyAuthenticate,
    RetryAfter,
    Server,
    SetCookie,
    Vary,
    WwwAuthenticate,
}

const TABLE: [(KnownHeader, &str); KnownHeader::COUNT] = [
    (KnownHeader::CacheControl, "Cache-Control"),
    (KnownHeader::Connection, "Connection"),
    (KnownHeader::Date, "Date"),
    (KnownHeader::KeepAlive, "Keep-Alive"),
    (KnownHeader::Pragma, "Pragma"),
    (KnownHeader::Trailer, "Trailer"),
    (KnownHeader::TransferEncoding, "Transfer-Encoding"),
    (KnownHeader::Upgrade, "Upgrade"),
    (KnownHeader::Via, "Via"),
    (KnownHeader::Warning, "Warning"),
    (KnownHeader::Allow, "Allow"),
    (KnownHeader::ContentLength, "Content-Length"),
    (KnownHeader::ContentType, "Content-Type"),
    (KnownHeader::ContentEncoding, "Content-Encoding"),
    (KnownHeader::ContentLanguage, "Content-Language"),
    (KnownHeader::ContentLocation, "Content-Location"),
    (KnownHeader::ContentMd5, "Content-MD5"),
    (KnownHeader::ContentRange, "Content-Range"),
    (KnownHeader::Expires, "Expires"),
    (KnownHeader::LastModified, "Last-Modified"),
    (KnownHeader::AcceptRanges, "Accept-Ranges"),
    (KnownHeader::Age, "Age"),
    (KnownHeader::ETag, "ETag"),
    (KnownHeader::Location, "Location"),
    (KnownHeader::ProxyAuthenticate, "Proxy-Authenticate"),
    (KnownHeader::RetryAfter, "Retry-After"),
    (KnownHeader::Server, "Server"),
    (KnownHeader::SetCookie, "Set-Cookie"),
    (KnownHeader::Vary, "Vary"),
    (KnownHeader::WwwAuthenticate, "WWW-Authenticate"),
];

impl KnownHeader {
    /// Number of slots in the known-header table.
    pub const COUNT: usize = 30;

    /// Lookup a header name, ASCII case-insensitive.
    pub fn from_name(name: &str) -> Option<KnownHeader> {
        TABLE.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)).map(|(id, _)| *id)
    }

    /// Returns the header at given table index.
    #[inline]
    pub fn from_index(index: usize) -> Option<KnownHeader> {
        TABLE.get(index).map(|(id, _)| *id)
    }

    /// Returns the table index.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the canonical header name.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        TABLE[self as usize].1
    }
}
