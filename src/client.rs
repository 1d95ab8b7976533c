//! Per-connection state and socket I/O.

use std::io::{self, Read};
use std::time::Instant;

use mio::net::TcpStream;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::Result;

/// Connection lifecycle. `Disconnecting` connections are torn down by the
/// server's cleanup pass at the end of the loop iteration; a fully
/// disconnected connection is an empty slot and never appears in the poll
/// interest set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for CONNECT.
    Connecting,
    /// CONNECT accepted.
    Connected,
    /// Marked for teardown.
    Disconnecting,
}

/// Result of draining the socket into the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The socket would block; everything available is buffered.
    Drained,
    /// The read buffer is full; frame and consume, then read again.
    BufferFull,
    /// The peer closed the connection.
    Closed,
}

/// A client TCP connection with its buffers.
pub struct Connection {
    pub socket: TcpStream,
    pub state: ConnectionState,
    /// Stamp of the last packet received, for keep-alive enforcement.
    pub last_packet_time: Instant,
    read_buf: ReadBuffer,
    write_buf: WriteBuffer,
}

impl Connection {
    pub fn new(socket: TcpStream, read_capacity: usize, write_capacity: usize) -> Self {
        Self {
            socket,
            state: ConnectionState::Connecting,
            last_packet_time: Instant::now(),
            read_buf: ReadBuffer::with_capacity(read_capacity),
            write_buf: WriteBuffer::with_capacity(write_capacity),
        }
    }

    /// Read from the socket into the read buffer until it would block, the
    /// buffer is full, or the peer closes.
    ///
    /// The caller frames and consumes buffered packets after every call; on
    /// `BufferFull` it must call again once the framing loop has freed
    /// space, because the poll registration is edge-triggered and the
    /// socket may still hold data.
    pub fn read(&mut self) -> Result<ReadOutcome> {
        loop {
            let spare = self.read_buf.spare();
            if spare.is_empty() {
                return Ok(ReadOutcome::BufferFull);
            }

            match self.socket.read(spare) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => {
                    self.read_buf.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Drained);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Buffered-but-unconsumed bytes.
    pub fn data(&self) -> &[u8] {
        self.read_buf.data()
    }

    /// Discard the first `n` buffered bytes after a packet is handled.
    pub fn consume(&mut self, n: usize) {
        self.read_buf.consume(n);
    }

    pub fn read_buffer_full(&self) -> bool {
        self.read_buf.is_full()
    }

    /// Queue bytes for delivery. `WouldBlock` means the client is too slow
    /// and the caller drops the delivery.
    pub fn queue(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_buf.queue(bytes)
    }

    /// Push pending bytes to the socket. `Ok(true)` when fully drained.
    pub fn flush(&mut self) -> io::Result<bool> {
        self.write_buf.write_to(&mut self.socket)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.write_buf.has_pending()
    }
}
