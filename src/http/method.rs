/// Request method as classified by the listener.
///
/// Methods the listener does not recognize are reported as [`Method::Unknown`], the raw token
/// is still available from [`Request::raw_method`].
///
/// [`Request::raw_method`]: crate::request::Request::raw_method
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Unknown,
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Track,
    Move,
    Copy,
    Propfind,
    Proppatch,
    Mkcol,
    Lock,
    Unlock,
    Search,
}

verbs! {
    Options = b"OPTIONS",
    Get = b"GET",
    Head = b"HEAD",
    Post = b"POST",
    Put = b"PUT",
    Delete = b"DELETE",
    Trace = b"TRACE",
    Connect = b"CONNECT",
    Track = b"TRACK",
    Move = b"MOVE",
    Copy = b"COPY",
    Propfind = b"PROPFIND",
    Proppatch = b"PROPPATCH",
    Mkcol = b"MKCOL",
    Lock = b"LOCK",
    Unlock = b"UNLOCK",
    Search = b"SEARCH",
}

impl Method {
    /// Returns `true` if the method is `HEAD`.
    #[inline]
    pub const fn is_head(&self) -> bool {
        matches!(self, Self::Head)
    }
}

impl std::fmt::Display for Method {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===== Macros =====

macro_rules! verbs {
    ($($id:ident = $val:literal,)*) => {
        impl Method {
            /// Classify a method token, case-sensitive.
            #[inline]
            pub const fn from_bytes(src: &[u8]) -> Method {
                match src {
                    $($val => Self::$id,)*
                    _ => Self::Unknown,
                }
            }

            /// Returns the canonical token, `"UNKNOWN"` for unrecognized methods.
            #[inline]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    // SAFETY: literals are ascii
                    $(Self::$id => unsafe { str::from_utf8_unchecked($val) },)*
                    Self::Unknown => "UNKNOWN",
                }
            }
        }
    };
}

use verbs;
