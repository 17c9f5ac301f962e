//! Fixed-capacity byte ring for assembling serial frames
//!
//! Provides O(1) consume operations instead of O(n) Vec::drain().

/// Fixed-capacity ring buffer with O(1) advance
pub struct RingBuffer<const N: usize = 512> {
    data: [u8; N],
    head: usize, // Write position (next empty slot)
    tail: usize, // Read position (first valid byte)
    len: usize,
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append bytes, returning how many were dropped because the ring was full
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let mut dropped = 0;
        for &b in bytes {
            if self.len < N {
                self.data[self.head] = b;
                self.head = (self.head + 1) % N;
                self.len += 1;
            } else {
                dropped += 1;
            }
        }
        dropped
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn clear(&mut self) {
        self.advance(self.len);
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % N])
        } else {
            None
        }
    }

    /// Offset of the first occurrence of `byte`
    pub fn find(&self, byte: u8) -> Option<usize> {
        (0..self.len).find(|&i| self.data[(self.tail + i) % N] == byte)
    }

    /// Copy `len` bytes starting at logical `start`
    pub fn copy_out(&self, start: usize, len: usize) -> Option<Vec<u8>> {
        if start + len > self.len {
            return None;
        }
        Some(
            (start..start + len)
                .map(|i| self.data[(self.tail + i) % N])
                .collect(),
        )
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut rb: RingBuffer<16> = RingBuffer::new();
        assert!(rb.is_empty());
        rb.extend(b"hello");
        assert_eq!(rb.len(), 5);
        assert_eq!(rb.get(0), Some(b'h'));
        rb.advance(2);
        assert_eq!(rb.copy_out(0, 3).unwrap(), b"llo");
    }

    #[test]
    fn test_wraparound() {
        let mut rb: RingBuffer<8> = RingBuffer::new();
        rb.extend(b"abcdef");
        rb.advance(5);
        rb.extend(b"ghij\n");
        assert_eq!(rb.len(), 6);
        assert_eq!(rb.find(b'\n'), Some(5));
        assert_eq!(rb.copy_out(0, 5).unwrap(), b"fghij");
    }

    #[test]
    fn test_overflow_drops_bytes() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        assert_eq!(rb.extend(b"abcdef"), 2);
        assert!(rb.is_full());
        assert_eq!(rb.copy_out(0, 4).unwrap(), b"abcd");
        assert!(rb.copy_out(2, 4).is_none());
    }

    #[test]
    fn test_clear() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        rb.extend(b"ab");
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.find(b'a'), None);
    }
}
