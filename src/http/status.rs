//! Status code reason phrases.

/// Status codes whose responses never carry a body.
const NO_BODY: [u16; 5] = [100, 101, 204, 205, 304];

/// Returns `true` if `code` is accepted as a response status, `101..=999`.
#[inline]
pub const fn is_valid_status(code: u16) -> bool {
    code > 100 && code <= 999
}

/// Returns `false` for informational and "no content" statuses that must not carry a body or
/// body framing headers.
#[inline]
pub fn can_have_body(code: u16) -> bool {
    !NO_BODY.contains(&code)
}

macro_rules! reasons {
    ($($int:literal $msg:literal;)*) => {
        /// Returns the default reason phrase for a status code, empty for unregistered codes.
        pub const fn reason_phrase(code: u16) -> &'static str {
            match code {
                $($int => $msg,)*
                _ => "",
            }
        }
    };
}

reasons! {
    100 "Continue";
    101 "Switching Protocols";
    102 "Processing";
    103 "Early Hints";
    200 "OK";
    201 "Created";
    202 "Accepted";
    203 "Non-Authoritative Information";
    204 "No Content";
    205 "Reset Content";
    206 "Partial Content";
    207 "Multi-Status";
    208 "Already Reported";
    226 "IM Used";
    300 "Multiple Choices";
    301 "Moved Permanently";
    302 "Found";
    303 "See Other";
    304 "Not Modified";
    305 "Use Proxy";
    307 "Temporary Redirect";
    308 "Permanent Redirect";
    400 "Bad Request";
    401 "Unauthorized";
    402 "Payment Required";
    403 "Forbidden";
    404 "Not Found";
    405 "Method Not Allowed";
    406 "Not Acceptable";
    407 "Proxy Authentication Required";
    408 "Request Timeout";
    409 "Conflict";
    410 "Gone";
    411 "Length Required";
    412 "Precondition Failed";
    413 "Request Entity Too Large";
    414 "Request-Uri Too Long";
    415 "Unsupported Media Type";
    416 "Requested Range Not Satisfiable";
    417 "Expectation Failed";
    418 "I'm a teapot";
    421 "Misdirected Request";
    422 "Unprocessable Entity";
    423 "Locked";
    424 "Failed Dependency";
    426 "Upgrade Required";
    428 "Precondition Required";
    429 "Too Many Requests";
    431 "Request Header Fields Too Large";
    451 "Unavailable For Legal Reasons";
    500 "Internal Server Error";
    501 "Not Implemented";
    502 "Bad Gateway";
    503 "Service Unavailable";
    504 "Gateway Timeout";
    505 "Http Version Not Supported";
    506 "Variant Also Negotiates";
    507 "Insufficient Storage";
    508 "Loop Detected";
    510 "Not Extended";
    511 "Network Authentication Required";
}
