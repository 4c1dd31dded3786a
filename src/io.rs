//! Body stream capabilities.
//!
//! Request bodies are [`Readable`], response bodies are [`Writable`], an upgraded request is
//! both.
use crate::error::Error;

/// A stream that body bytes can be read from.
pub trait Readable {
    /// Read into `buf`, `Ok(0)` marks the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Read until the end of the stream, returns the number of bytes appended.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> impl Future<Output = Result<usize, Error>> + Send
    where
        Self: Send,
    {
        async move {
            let mut buf = [0u8; 8192];
            let mut total = 0;
            loop {
                match self.read(&mut buf).await? {
                    0 => return Ok(total),
                    n => {
                        out.extend_from_slice(&buf[..n]);
                        total += n;
                    }
                }
            }
        }
    }
}

/// A stream that body bytes can be written to.
pub trait Writable {
    /// Write all of `data`, possibly buffering it.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Send buffered data.
    fn flush(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}
