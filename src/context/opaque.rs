use crate::error::Error;
use crate::io::{Readable, Writable};
use crate::request::RequestStream;
use crate::response::ResponseBody;

/// Duplex byte stream of an upgraded request.
///
/// Reads receive raw bytes from the client, writes are sent without framing. [`split`] yields
/// both halves so they can be driven concurrently.
///
/// [`split`]: OpaqueStream::split
#[derive(Debug)]
pub struct OpaqueStream<'a> {
    read: &'a mut RequestStream,
    write: ResponseBody<'a>,
}

impl<'a> OpaqueStream<'a> {
    pub(crate) fn new(read: &'a mut RequestStream, write: ResponseBody<'a>) -> Self {
        Self { read, write }
    }

    pub fn split(&mut self) -> (&mut RequestStream, &mut ResponseBody<'a>) {
        (&mut *self.read, &mut self.write)
    }

    #[inline]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.read.read(buf).await
    }

    #[inline]
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.write.write(data).await
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.write.flush().await
    }
}

impl Readable for OpaqueStream<'_> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Error>> + Send {
        OpaqueStream::read(self, buf)
    }
}

impl Writable for OpaqueStream<'_> {
    #[inline]
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), Error>> + Send {
        OpaqueStream::write(self, data)
    }

    #[inline]
    fn flush(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        OpaqueStream::flush(self)
    }
}
