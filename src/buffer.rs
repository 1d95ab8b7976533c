//! Per-connection byte buffers.
//!
//! The read side is a fixed-capacity region filled from the socket and
//! drained by the framing loop with shift-down `consume` semantics. The
//! write side holds bytes accepted for delivery until the socket can take
//! them, with a soft cap that turns slow consumers into dropped deliveries
//! instead of unbounded memory.

use std::io::{self, Write};

/// Fixed-capacity read buffer. The valid region is `[0, len)`.
pub struct ReadBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Bytes read but not yet consumed.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Unfilled region for the socket to read into.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Record `n` bytes appended into the spare region.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.buf.len());
        self.len += n;
    }

    /// Drop the first `n` bytes, shifting the tail `[n, len)` down to the
    /// front. Bytes beyond `n` keep their values and order.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }
}

/// Pending-write buffer with a soft capacity cap.
///
/// `[pos, buf.len())` is the unsent region; the prefix is compacted away
/// once it grows past half the cap so the Vec does not creep.
pub struct WriteBuffer {
    buf: Vec<u8>,
    pos: usize,
    capacity: usize,
}

impl WriteBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            capacity,
        }
    }

    /// Accept `bytes` for later transmission. Fails with `WouldBlock` when
    /// the pending region would exceed the cap; the caller drops the
    /// delivery (QoS 0).
    pub fn queue(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.pending_len() + bytes.len() > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "write buffer full",
            ));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Write as much pending data as the sink accepts. Returns `Ok(true)`
    /// when fully drained, `Ok(false)` when the sink would block with bytes
    /// still pending.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> io::Result<bool> {
        while self.pos < self.buf.len() {
            match sink.write(&self.buf[self.pos..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ))
                }
                Ok(n) => {
                    self.pos += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.compact();
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.buf.clear();
        self.pos = 0;
        Ok(true)
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_pending(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn compact(&mut self) {
        if self.pos > self.capacity / 2 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}
