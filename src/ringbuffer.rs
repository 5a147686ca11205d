//! Fixed-capacity byte ring.
//!
//! The receive path buffers raw wire bytes here until a whole frame is available. The
//! capacity is a power of two, so wrapping a cursor is a single mask. The ring never grows:
//! when it is full the caller decides what to drop.

/// A byte ring with a power-of-two capacity `N`.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    start: usize,
    len: usize,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        N - 1
    };

    /// Creates an empty ring.
    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            buf: [0; N],
            start: 0,
            len: 0,
        }
    }

    /// Total number of bytes the ring can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if no further byte can be pushed.
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Appends a byte, handing it back if the ring is full.
    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            return Err(byte);
        }
        self.buf[(self.start + self.len) & Self::MASK] = byte;
        self.len += 1;
        Ok(())
    }

    /// Returns the unread byte at `offset` from the read cursor.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset >= self.len {
            return None;
        }
        Some(self.buf[(self.start + offset) & Self::MASK])
    }

    /// Copies the first `out.len()` unread bytes without consuming them.
    ///
    /// Returns `false` (and copies nothing) if fewer bytes are buffered.
    pub fn copy_to(&self, out: &mut [u8]) -> bool {
        if out.len() > self.len {
            return false;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.buf[(self.start + i) & Self::MASK];
        }
        true
    }

    /// Drops up to `count` unread bytes from the front and returns how many were dropped.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        self.start = (self.start + count) & Self::MASK;
        self.len -= count;
        count
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_peek_discard() {
        let mut ring: RingBuffer<8> = RingBuffer::new();
        assert!(ring.is_empty());
        for b in 1..=5 {
            ring.push(b).unwrap();
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.peek(0), Some(1));
        assert_eq!(ring.peek(4), Some(5));
        assert_eq!(ring.peek(5), None);

        assert_eq!(ring.discard(2), 2);
        assert_eq!(ring.peek(0), Some(3));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_wraps_around_capacity() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        for b in 0..4 {
            ring.push(b).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(9), Err(9));

        assert_eq!(ring.discard(3), 3);
        ring.push(4).unwrap();
        ring.push(5).unwrap();
        ring.push(6).unwrap();

        let mut out = [0u8; 4];
        assert!(ring.copy_to(&mut out));
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_copy_to_needs_enough_bytes() {
        let mut ring: RingBuffer<16> = RingBuffer::new();
        ring.push(7).unwrap();
        let mut out = [0u8; 2];
        assert!(!ring.copy_to(&mut out));
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_discard_more_than_buffered() {
        let mut ring: RingBuffer<16> = RingBuffer::new();
        ring.push(1).unwrap();
        assert_eq!(ring.discard(10), 1);
        assert!(ring.is_empty());
        ring.clear();
        assert_eq!(ring.capacity(), 16);
    }
}
