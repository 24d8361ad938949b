//! Session socket abstraction.
//!
//! The agent talks to its collector over one connected datagram socket at
//! a time. [`Transport`] is the seam the handshake and keep-alive code are
//! written against; [`UdpTransport`] is the production implementation.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// Largest datagram the agent expects from a collector.
pub const MAX_DATAGRAM: usize = 65_536;

/// An exclusively owned, connected datagram socket.
pub trait Transport: Send {
    /// Send one datagram to the connected peer.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Receive one datagram without blocking.
    ///
    /// Returns `Ok(None)` when nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns transport-level receive errors other than `WouldBlock`.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Switch the socket to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    fn set_nonblocking(&self) -> io::Result<()>;

    /// Address of the connected peer.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

/// Owned handle stored in the runtime state's socket slot.
pub type SessionSocket = Box<dyn Transport>;

/// Connected UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port of the matching family and connect to
    /// `peer`. No name lookup happens here.
    ///
    /// # Errors
    ///
    /// Returns the bind or connect error.
    pub fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let inner = UdpSocket::bind(local)?;
        inner.connect(peer)?;
        Ok(Self { inner })
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.send(buf)
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inner.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        self.inner.set_nonblocking(true)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}
