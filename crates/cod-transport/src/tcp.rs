use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::fd::RawFd;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::{Duplex, Stream};

/// TCP listener handing out connections as [`Duplex`] pairs.
pub struct TcpAcceptor {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind and listen on `addr`. Port `0` picks a free port; see
    /// [`TcpAcceptor::local_addr`].
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: format!("{addr:?}"),
            source: e,
        })?;
        let addr = listener.local_addr()?;

        info!(%addr, "listening on tcp socket");

        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Duplex> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        split_stream(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl std::fmt::Debug for TcpAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpAcceptor")
            .field("addr", &self.addr)
            .finish()
    }
}

/// Connect to a listening TCP socket (blocking).
pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Duplex> {
    let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
        addr: format!("{addr:?}"),
        source: e,
    })?;
    debug!(?addr, "connected to tcp socket");
    split_stream(stream)
}

/// Reattach to a TCP connection through descriptors this process already
/// holds (inherited across `fork`, or opened by another context here).
///
/// Both descriptors must be sockets connected to `peer`; the connection is
/// shared, not reopened, so session state on the remote end carries over.
#[cfg(unix)]
pub fn reattach_tcp(read_fd: RawFd, write_fd: RawFd, peer: SocketAddr) -> Result<Duplex> {
    let read = attach_socket(read_fd, peer)?;
    let write = attach_socket(write_fd, peer)?;
    debug!(read_fd, write_fd, %peer, "reattached to inherited tcp connection");
    Ok(Duplex {
        read: Stream::from_tcp(read),
        write: Stream::from_tcp(write),
    })
}

#[cfg(unix)]
fn attach_socket(fd: RawFd, peer: SocketAddr) -> Result<TcpStream> {
    let info = crate::fd::inspect(fd)?;
    if !info.socket {
        return Err(crate::fd::mismatch(fd, format!("a tcp connection to {peer}")));
    }
    let stream = TcpStream::from(crate::fd::dup(fd)?);
    match stream.peer_addr() {
        Ok(actual) if actual == peer => Ok(stream),
        _ => Err(crate::fd::mismatch(fd, format!("a tcp connection to {peer}"))),
    }
}

fn split_stream(stream: TcpStream) -> Result<Duplex> {
    // Request/reply traffic is small; do not let Nagle hold back a command.
    stream.set_nodelay(true)?;
    let write = stream.try_clone()?;
    Ok(Duplex {
        read: Stream::from_tcp(stream),
        write: Stream::from_tcp(write),
    })
}
