use bytes::Bytes;

/// Ordered body segments waiting for the next flush.
///
/// Segments are either private copies of caller data or shared buffers appended without a
/// copy. They are sent in append order and cleared after every flush.
#[derive(Debug, Default)]
pub struct BufferBuilder {
    segments: Vec<Bytes>,
    total: usize,
}

impl BufferBuilder {
    #[inline]
    pub const fn new() -> Self {
        Self { segments: Vec::new(), total: 0 }
    }

    /// Append a shared buffer without copying.
    pub fn add(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.total += data.len();
            self.segments.push(data);
        }
    }

    /// Append a private copy of `data`.
    pub fn copy_and_add(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.add(Bytes::copy_from_slice(data));
        }
    }

    /// Returns the sum of all segment lengths.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total
    }

    /// Returns the number of segments.
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns segments in append order.
    #[inline]
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.total = 0;
    }
}
