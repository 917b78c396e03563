//! In-memory duplex transport.
//!
//! Two connected endpoints share a byte queue per direction. A bounded pair
//! refuses writes once the peer's queue is full, which exercises the
//! session's `WouldBlock` paths without sockets.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Pipe {
    data: VecDeque<u8>,
    closed: bool,
}

type SharedPipe = Arc<Mutex<Pipe>>;

/// One end of an in-memory connection.
///
/// Reads from an empty queue return `WouldBlock` until the peer is dropped
/// or [`close`](Self::close)d, after which they return `0`.
#[derive(Debug)]
pub struct MemoryTransport {
    incoming: SharedPipe,
    outgoing: SharedPipe,
    capacity: Option<usize>,
}

impl MemoryTransport {
    /// Connected pair with unbounded queues.
    pub fn pair() -> (Self, Self) {
        Self::build(None)
    }

    /// Connected pair where each direction holds at most `capacity` bytes.
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> (Self, Self) {
        let a_to_b = SharedPipe::default();
        let b_to_a = SharedPipe::default();
        let a = Self {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            capacity,
        };
        let b = Self {
            incoming: a_to_b,
            outgoing: b_to_a,
            capacity,
        };
        (a, b)
    }

    /// Bytes waiting to be read on this end.
    pub fn pending(&self) -> usize {
        lock(&self.incoming).data.len()
    }

    /// Inject raw bytes as if the peer had sent them.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.incoming).data.extend(bytes);
    }

    /// Take everything queued for reading on this end.
    pub fn drain(&self) -> Vec<u8> {
        lock(&self.incoming).data.drain(..).collect()
    }

    /// Signal end of stream to the peer.
    pub fn close(&self) {
        lock(&self.outgoing).closed = true;
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
        lock(&self.incoming).closed = true;
    }
}

fn lock(pipe: &SharedPipe) -> std::sync::MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(|e| e.into_inner())
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.incoming);
        if pipe.data.is_empty() {
            return if pipe.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(pipe.data.len());
        for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.outgoing);
        if pipe.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let room = match self.capacity {
            Some(cap) => cap.saturating_sub(pipe.data.len()),
            None => buf.len(),
        };
        if room == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(room);
        pipe.data.extend(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
