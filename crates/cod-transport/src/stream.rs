use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::trace;

use crate::error::Result;
use crate::memory::MemoryEnd;

/// Which kind of transport a [`Stream`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Pipe,
    Tcp,
    Memory,
}

impl StreamKind {
    /// Transport name for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Pipe => "pipe",
            StreamKind::Tcp => "tcp",
            StreamKind::Memory => "memory",
        }
    }
}

/// One side of a transport.
///
/// Reading and writing go through `&Stream`, so a single stream can be shared
/// behind an `Arc` by every channel instance that holds this side. The OS
/// resource is released when the last owner drops it.
pub struct Stream {
    inner: StreamInner,
}

enum StreamInner {
    #[cfg(unix)]
    Pipe(std::fs::File),
    Tcp(TcpStream),
    Memory(MemoryEnd),
}

impl Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Pipe(file) => {
                let mut file: &std::fs::File = file;
                file.read(buf)
            }
            StreamInner::Tcp(stream) => {
                let mut stream: &TcpStream = stream;
                stream.read(buf)
            }
            StreamInner::Memory(end) => end.read(buf),
        }
    }
}

impl Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Pipe(file) => {
                let mut file: &std::fs::File = file;
                file.write(buf)
            }
            StreamInner::Tcp(stream) => {
                let mut stream: &TcpStream = stream;
                stream.write(buf)
            }
            StreamInner::Memory(end) => end.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Pipe(_) => Ok(()),
            StreamInner::Tcp(stream) => {
                let mut stream: &TcpStream = stream;
                stream.flush()
            }
            StreamInner::Memory(_) => Ok(()),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut this: &Stream = self;
        this.read(buf)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut this: &Stream = self;
        this.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut this: &Stream = self;
        this.flush()
    }
}

impl Stream {
    #[cfg(unix)]
    pub(crate) fn from_pipe(file: std::fs::File) -> Self {
        Self {
            inner: StreamInner::Pipe(file),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }

    pub(crate) fn from_memory(end: MemoryEnd) -> Self {
        Self {
            inner: StreamInner::Memory(end),
        }
    }

    /// The transport this stream belongs to.
    pub fn kind(&self) -> StreamKind {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Pipe(_) => StreamKind::Pipe,
            StreamInner::Tcp(_) => StreamKind::Tcp,
            StreamInner::Memory(_) => StreamKind::Memory,
        }
    }

    /// Wait up to `timeout` for the stream to become readable.
    ///
    /// `Some(Duration::ZERO)` probes without blocking; `None` waits forever.
    /// End-of-stream counts as readable: the next read returns `0`
    /// immediately.
    pub fn poll_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Pipe(file) => {
                use std::os::fd::AsRawFd;
                crate::poll::poll_readable(file.as_raw_fd(), timeout)
            }
            #[cfg(unix)]
            StreamInner::Tcp(stream) => {
                use std::os::fd::AsRawFd;
                crate::poll::poll_readable(stream.as_raw_fd(), timeout)
            }
            #[cfg(not(unix))]
            StreamInner::Tcp(_) => {
                let _ = timeout;
                Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "readiness polling requires a unix platform",
                )
                .into())
            }
            StreamInner::Memory(end) => Ok(end.poll_readable(timeout)),
        }
    }

    /// The OS descriptor backing this stream, if it has one.
    #[cfg(unix)]
    pub fn raw_fd(&self) -> Option<i32> {
        use std::os::fd::AsRawFd;

        match &self.inner {
            StreamInner::Pipe(file) => Some(file.as_raw_fd()),
            StreamInner::Tcp(stream) => Some(stream.as_raw_fd()),
            StreamInner::Memory(_) => None,
        }
    }

    /// The OS descriptor backing this stream, if it has one.
    #[cfg(not(unix))]
    pub fn raw_fd(&self) -> Option<i32> {
        None
    }

    /// Half-close a TCP connection for writing.
    ///
    /// The peer reads end-of-stream even though descriptors on the
    /// connection stay open here or in forked children. This acts on the
    /// connection itself, so writes through every handle on it fail
    /// afterwards, in every process. Dropping a stream never does this
    /// implicitly. Pipes and memory streams have no shared connection to
    /// shut down; for them this is a no-op.
    pub fn shutdown_write(&self) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => {
                trace!("half-closing tcp connection for writing");
                stream.shutdown(Shutdown::Write)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Remote address for TCP streams.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.peer_addr().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &self.kind().as_str())
            .field("fd", &self.raw_fd())
            .finish()
    }
}

/// The two sides of a freshly opened transport.
///
/// For pipes these are distinct descriptors; for TCP they are two
/// descriptors on the same connection; for the in-memory double they are the
/// two ends of one buffer.
#[derive(Debug)]
pub struct Duplex {
    pub read: Stream,
    pub write: Stream,
}

impl Duplex {
    /// The transport both sides belong to.
    pub fn kind(&self) -> StreamKind {
        self.read.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_reference_reads_and_writes() {
        let duplex = crate::memory_pipe();
        let writer = std::sync::Arc::new(duplex.write);

        (&*writer).write_all(b"abc").unwrap();
        let mut buf = [0u8; 3];
        (&duplex.read).read_exact(&mut buf).unwrap();

        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn kind_names() {
        assert_eq!(StreamKind::Pipe.as_str(), "pipe");
        assert_eq!(StreamKind::Tcp.as_str(), "tcp");
        assert_eq!(StreamKind::Memory.as_str(), "memory");
    }

    #[test]
    #[cfg(unix)]
    fn dropping_tcp_write_side_leaves_connection_open() {
        let acceptor = crate::TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr().unwrap();
        let client = std::thread::spawn(move || crate::connect(addr).unwrap());
        let server = acceptor.accept().unwrap();
        let client = client.join().unwrap();

        // Another descriptor on the connection (here the read side, after a
        // fork a child's copy) keeps it writable and the peer sees no EOF.
        drop(client.write);
        let timeout = Some(Duration::from_millis(50));
        assert!(!server.read.poll_readable(timeout).unwrap());

        drop(client.read);
        let mut buf = [0u8; 8];
        assert_eq!((&server.read).read(&mut buf).unwrap(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_write_signals_eof_while_reading_continues() {
        let acceptor = crate::TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr().unwrap();
        let client = std::thread::spawn(move || crate::connect(addr).unwrap());
        let server = acceptor.accept().unwrap();
        let client = client.join().unwrap();

        client.write.shutdown_write().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!((&server.read).read(&mut buf).unwrap(), 0);
        (&server.write).write_all(b"late").unwrap();
        (&client.read).read_exact(&mut buf[..4]).unwrap();
        assert_eq!(&buf[..4], b"late");
    }

    #[test]
    fn shutdown_write_is_a_no_op_for_memory() {
        let duplex = crate::memory_pipe();
        duplex.write.shutdown_write().unwrap();
        (&duplex.write).write_all(b"x").unwrap();
    }
}
