//! UDP transport for SNTP exchanges.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use contracts::{SntpTransport, TransportFactory};
use tracing::{debug, instrument};

/// Default NTP port
pub const NTP_PORT: u16 = 123;

/// Opens one connected, ephemeral UDP socket per sync call
#[derive(Debug, Clone, Copy)]
pub struct UdpTransportFactory {
    port: u16,
}

impl UdpTransportFactory {
    /// Factory targeting `port` on every server
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    fn resolve(&self, server: &str) -> io::Result<SocketAddr> {
        // Accept "host:port" verbatim, otherwise append the configured port
        let addrs = match server.parse::<SocketAddr>() {
            Ok(addr) => vec![addr],
            Err(_) if server.contains(':') && !server.contains("::") => {
                server.to_socket_addrs()?.collect()
            }
            Err(_) => (server, self.port).to_socket_addrs()?.collect(),
        };

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for '{server}'"),
                )
            })
    }
}

impl Default for UdpTransportFactory {
    fn default() -> Self {
        Self::new(NTP_PORT)
    }
}

impl TransportFactory for UdpTransportFactory {
    #[instrument(name = "udp_transport_open", level = "debug", skip(self))]
    fn open(&self, server: &str, timeout: Duration) -> io::Result<Box<dyn SntpTransport>> {
        let addr = self.resolve(server)?;
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(timeout))?;

        debug!(server = %server, addr = %addr, "UDP transport connected");
        Ok(Box::new(UdpTransport { socket }))
    }
}

/// Connected UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl SntpTransport for UdpTransport {
    fn send(&mut self, request: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(request)?;
        if sent != request.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, request.len()),
            ));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    fn discard_pending(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 64];
        let mut discarded = 0;

        self.socket.set_nonblocking(true)?;
        let drained = loop {
            match self.socket.recv(&mut buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(discarded),
                // ICMP errors from an earlier send surface here; nothing is queued behind them
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => break Ok(discarded),
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;

        if discarded > 0 {
            debug!(discarded, "dropped stale datagrams");
        }
        drained
    }
}
