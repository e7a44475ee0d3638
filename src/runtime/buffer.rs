//! Per-endpoint byte buffers.
//!
//! - `InboundBuffer`: bytes accumulated from completed reads until the
//!   endpoint hands them to its data handler.
//! - `OutboundQueue`: bytes accepted by `write` but not yet confirmed by a
//!   write completion. The in-flight write always covers a prefix of it.

use bytes::{Buf, Bytes, BytesMut};

/// Accumulates inbound bytes between handler invocations.
#[derive(Debug, Default)]
pub struct InboundBuffer {
    buf: BytesMut,
}

impl InboundBuffer {
    /// Create a buffer with room for one read chunk.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append the bytes delivered by a read completion.
    pub fn commit(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Drain everything accumulated so far as one sequence.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// FIFO of bytes waiting to reach the peer.
///
/// Split in two: the frozen bytes of the current write request, and the
/// bytes queued behind it. Issuing and re-issuing a request never copies.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    in_flight: Bytes,
    queued: BytesMut,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes behind everything already pending.
    pub fn push(&mut self, data: &[u8]) {
        self.queued.extend_from_slice(data);
    }

    /// Bytes for the next write request.
    ///
    /// The unconfirmed remainder of the previous request goes first; once
    /// it is drained, everything queued so far is frozen into a new one.
    pub fn pending(&mut self) -> Bytes {
        if self.in_flight.is_empty() {
            self.in_flight = self.queued.split().freeze();
        }
        self.in_flight.clone()
    }

    /// Drop `count` bytes confirmed by a write completion.
    ///
    /// Returns the number of bytes actually removed.
    pub fn consume(&mut self, count: usize) -> usize {
        let count = count.min(self.in_flight.len());
        self.in_flight.advance(count);
        count
    }

    pub fn len(&self) -> usize {
        self.in_flight.len() + self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_coalesces_chunks() {
        let mut inbound = InboundBuffer::with_capacity(16);
        inbound.commit(b"hello ");
        inbound.commit(b"world");
        assert_eq!(inbound.len(), 11);

        let data = inbound.take();
        assert_eq!(&data[..], b"hello world");
        assert!(inbound.is_empty());

        // Nothing left over for the next batch
        inbound.commit(b"!");
        assert_eq!(&inbound.take()[..], b"!");
    }

    #[test]
    fn test_outbound_partial_consume() {
        let mut queue = OutboundQueue::new();
        queue.push(b"abcdef");

        let request = queue.pending();
        assert_eq!(&request[..], b"abcdef");

        // Bytes queued while a write is in flight wait behind its remainder
        queue.push(b"gh");
        assert_eq!(queue.consume(4), 4);
        assert_eq!(queue.len(), 4);
        assert_eq!(&queue.pending()[..], b"ef");

        assert_eq!(queue.consume(100), 2);
        assert_eq!(&queue.pending()[..], b"gh");
        assert_eq!(queue.consume(2), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_outbound_reissue_shares_storage() {
        let mut queue = OutboundQueue::new();
        queue.push(&vec![7u8; 1 << 20]);

        let first = queue.pending();
        queue.consume(4096);
        let second = queue.pending();

        // The remainder is a view into the same request, not a copy
        assert_eq!(second.len(), first.len() - 4096);
        assert_eq!(second.as_ptr(), first[4096..].as_ptr());
    }
}
