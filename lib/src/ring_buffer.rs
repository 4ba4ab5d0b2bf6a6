//! Byte FIFO with runtime capacity.
//!
//! The socket send/receive buffers use this, sized from the network
//! configuration. `write` and `read` move as many bytes as fit and report
//! the count; the caller decides whether a short transfer is an error.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

/// Heap-backed byte ring.
#[derive(Debug)]
pub struct ByteRing {
    data: Vec<u8>,
    head: usize,
    tail: usize,
    used: usize,
}

impl ByteRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            head: 0,
            tail: 0,
            used: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.used = 0;
    }

    /// Append up to `src.len()` bytes; returns how many were copied in.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free());
        for &b in &src[..n] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % self.capacity();
        }
        self.used += n;
        n
    }

    /// Remove up to `dst.len()` bytes; returns how many were copied out.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.used);
        for slot in dst[..n].iter_mut() {
            *slot = self.data[self.tail];
            self.tail = (self.tail + 1) % self.capacity();
        }
        self.used -= n;
        n
    }

    /// Drop up to `n` bytes from the front; returns how many were dropped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.used);
        self.tail = (self.tail + n) % self.capacity();
        self.used -= n;
        n
    }
}
