//! Append-only holder for streams assembled from several fragments.
//!
//! Some record formats split one logical payload across several sibling
//! streams. [`StreamHolder`] accumulates those fragments in order and hands
//! consumers a read-only snapshot, or a frozen [`Bytes`] once assembly is
//! finished.

use bytes::Bytes;

/// Initial capacity of a holder, in bytes
const INITIAL_CAPACITY: usize = 4096;

/// Growable single-writer buffer with explicit capacity doubling
#[derive(Debug, Clone, Default)]
pub struct StreamHolder {
    data: Vec<u8>,
    /// Paths of the fragments appended so far
    fragments: Vec<String>,
}

impl StreamHolder {
    /// Create an empty holder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            fragments: Vec::new(),
        }
    }

    /// Grow the buffer so `additional` more bytes fit
    ///
    /// Capacity doubles (starting from 4096) until it covers the request,
    /// so repeated appends cost amortized constant time.
    fn reserve(&mut self, additional: usize) {
        let required = self.data.len() + additional;
        if required <= self.data.capacity() {
            return;
        }
        let mut capacity = self.data.capacity().max(INITIAL_CAPACITY);
        while capacity < required {
            capacity = capacity.saturating_mul(2);
        }
        self.data.reserve_exact(capacity - self.data.len());
    }

    /// Append raw bytes
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Append a named fragment
    pub fn append_fragment(&mut self, path: impl Into<String>, bytes: &[u8]) {
        self.fragments.push(path.into());
        self.append(bytes);
    }

    /// Read-only view of everything appended so far
    pub fn snapshot(&self) -> &[u8] {
        &self.data
    }

    /// Paths of the fragments, in append order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Finish assembly and share the bytes
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.data)
    }
}
