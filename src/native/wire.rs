use bytes::{BufMut, BytesMut};
use std::time::Duration;

use crate::headers::KnownHeader;

/// Response head in the listener's layout.
///
/// Single valued known headers occupy their slot in `known`, known headers with several values
/// are listed in `multi_known`, every other header is listed in `unknown` once per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub known: [Option<String>; KnownHeader::COUNT],
    pub multi_known: Vec<MultipleKnownHeaders>,
    pub unknown: Vec<(String, String)>,
    /// Kernel response cache lifetime hint.
    pub cache_ttl: Option<Duration>,
}

/// Known header carrying more than one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleKnownHeaders {
    pub id: KnownHeader,
    pub values: Vec<String>,
    /// Values must be emitted in the given order.
    pub preserve_order: bool,
}

impl ResponseHead {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            known: std::array::from_fn(|_| None),
            multi_known: Vec::new(),
            unknown: Vec::new(),
            cache_ttl: None,
        }
    }

    /// Returns every value emitted for `name`, in wire order.
    pub fn values(&self, name: &str) -> Vec<&str> {
        match KnownHeader::from_name(name) {
            Some(id) => {
                let single = self.known[id.index()].as_deref();
                let multi = self
                    .multi_known
                    .iter()
                    .filter(|e| e.id == id)
                    .flat_map(|e| e.values.iter().map(String::as_str));
                single.into_iter().chain(multi).collect()
            }
            None => self
                .unknown
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .collect(),
        }
    }

    /// Write the head in HTTP/1.1 wire format, including the terminating empty line.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut status = itoa::Buffer::new();
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(status.format(self.status).as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.reason.as_bytes());
        buf.put_slice(b"\r\n");

        for (idx, value) in self.known.iter().enumerate() {
            if let (Some(value), Some(id)) = (value, KnownHeader::from_index(idx)) {
                put_field(buf, id.as_str(), value);
            }
        }
        for multi in &self.multi_known {
            for value in &multi.values {
                put_field(buf, multi.id.as_str(), value);
            }
        }
        for (name, value) in &self.unknown {
            put_field(buf, name, value);
        }

        buf.put_slice(b"\r\n");
    }
}

fn put_field(buf: &mut BytesMut, name: &str, value: &str) {
    buf.reserve(name.len() + value.len() + 4);
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}
