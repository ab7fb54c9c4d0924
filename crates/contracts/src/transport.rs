//! SNTP transport abstraction
//!
//! One transport is opened per sync call and dropped afterwards.

use std::io;
use std::time::Duration;

/// A connected datagram transport to one time server
pub trait SntpTransport: Send {
    /// Send one request datagram
    fn send(&mut self, request: &[u8]) -> io::Result<()>;

    /// Block until a response arrives or the receive timeout expires
    ///
    /// Returns the number of bytes written into `buf`.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop any datagrams already queued, returning how many were dropped
    ///
    /// Called before each request so a reply that arrived after its attempt
    /// timed out is never paired with the next request.
    fn discard_pending(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}

/// Opens transports to named servers
pub trait TransportFactory: Send + Sync {
    /// Resolve `server` and open an ephemeral transport with the given receive timeout
    fn open(&self, server: &str, timeout: Duration) -> io::Result<Box<dyn SntpTransport>>;
}
