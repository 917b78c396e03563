//! Byte transport consumed by a session.

use std::io::{self, Read, Write};

/// Push/pull byte channel under a session.
///
/// `ErrorKind::WouldBlock` and `ErrorKind::Interrupted` are transient: the
/// session keeps its progress and the call can be retried. A `recv` of zero
/// bytes means the peer closed the connection.
pub trait Transport {
    /// Write some of `buf`, returning how much was taken.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read into `buf`, returning how much was filled.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: Read + Write> Transport for T {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}
