//! Datagram transport used by the poller
//!
//! One UDP socket, bound to a fixed local port and connected to the query
//! endpoint of a single game server. The socket is non-blocking: the poll loop
//! checks for a datagram once per iteration and never waits on the kernel.

use log::{debug, info};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// Largest datagram read in one go. Split (multi-packet) responses are not
/// requested by this client.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// The two socket operations the poll state machine depends on.
pub trait Link {
    /// Fire-and-forget send of one datagram.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Returns `Ok(None)` when nothing is waiting.
    fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>>;
}

pub struct Transport {
    socket: Option<UdpSocket>,
    remote: SocketAddr,
    buffer: Vec<u8>,
}

impl Transport {
    /// Binds `local_port` (0 picks an ephemeral port) and connects to `remote`
    /// so datagrams from any other peer are dropped by the kernel.
    pub fn bind(local_port: u16, remote: SocketAddr) -> io::Result<Self> {
        let local = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, local_port))
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_nonblocking(true)?;

        info!(
            "Query socket bound to {}, talking to {}",
            socket.local_addr()?,
            remote
        );

        Ok(Transport {
            socket: Some(socket),
            remote,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Some(socket) => socket.local_addr(),
            None => Err(closed()),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Releases the socket. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Query socket to {} closed", self.remote);
        }
    }
}

impl Link for Transport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        socket.send(data)?;
        Ok(())
    }

    fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        match socket.recv(&mut self.buffer) {
            Ok(len) => Ok(Some(self.buffer[..len].to_vec())),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "query socket is closed")
}
