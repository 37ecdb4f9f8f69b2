use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::BytesMut;
use cod_transport::Stream;
use tracing::trace;

use crate::error::{ChannelError, Result};
use crate::serializer::Serializer;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Receive state of one channel instance: bytes pulled from the transport
/// but not decoded yet, at most one decoded-ahead item, and whether the
/// transport has reported end-of-stream.
pub(crate) struct Inbound<T> {
    buf: BytesMut,
    pending: Option<T>,
    eof: bool,
}

impl<T> Inbound<T> {
    pub(crate) fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            pending: None,
            eof: false,
        }
    }

    /// True if nothing has been pulled from the transport or decoded ahead.
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.pending.is_none()
    }

    pub(crate) fn clear(&mut self) {
        self.buf = BytesMut::new();
        self.pending = None;
    }

    /// Receive the next item, blocking until one is complete or the stream
    /// ends. With a timeout, each wait for more bytes is bounded by it.
    pub(crate) fn recv<S>(
        &mut self,
        stream: &Stream,
        serializer: &S,
        timeout: Option<Duration>,
    ) -> Result<T>
    where
        S: Serializer<Item = T>,
    {
        loop {
            if let Some(item) = self.next_buffered(serializer)? {
                return Ok(item);
            }

            if let Some(timeout) = timeout {
                if !stream.poll_readable(Some(timeout))? {
                    return Err(ChannelError::Timeout(timeout));
                }
            }

            self.fill(stream)?;
        }
    }

    /// Receive the next item if it can be had without blocking.
    pub(crate) fn try_recv<S>(&mut self, stream: &Stream, serializer: &S) -> Result<Option<T>>
    where
        S: Serializer<Item = T>,
    {
        loop {
            if let Some(item) = self.next_buffered(serializer)? {
                return Ok(Some(item));
            }

            if !stream.poll_readable(Some(Duration::ZERO))? {
                return Ok(None);
            }

            self.fill(stream)?;
        }
    }

    /// Pull whatever the transport has ready and decode one item ahead.
    ///
    /// Returns true if an item is ready for the next receive. End-of-stream
    /// is reported as `false`, never as an error.
    pub(crate) fn probe<S>(&mut self, stream: &Stream, serializer: &S) -> Result<bool>
    where
        S: Serializer<Item = T>,
    {
        if self.pending.is_some() {
            return Ok(true);
        }

        loop {
            if let Some(item) = serializer.decode(&mut self.buf)? {
                self.pending = Some(item);
                return Ok(true);
            }

            if self.eof || !stream.poll_readable(Some(Duration::ZERO))? {
                return Ok(false);
            }

            self.fill(stream)?;
        }
    }

    /// The decoded-ahead item, else the next item decodable from the buffer.
    /// At end-of-stream an empty buffer becomes [`ChannelError::EndOfStream`].
    fn next_buffered<S>(&mut self, serializer: &S) -> Result<Option<T>>
    where
        S: Serializer<Item = T>,
    {
        if let Some(item) = self.pending.take() {
            return Ok(Some(item));
        }

        if let Some(item) = serializer.decode(&mut self.buf)? {
            return Ok(Some(item));
        }

        if self.eof {
            return match serializer.decode_eof(&mut self.buf)? {
                Some(item) => Ok(Some(item)),
                None => Err(ChannelError::EndOfStream),
            };
        }

        Ok(None)
    }

    /// One blocking read from the transport into the buffer.
    fn fill(&mut self, stream: &Stream) -> Result<()> {
        if self.buf.capacity() == 0 {
            self.buf.reserve(INITIAL_BUFFER_CAPACITY);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut reader: &Stream = stream;
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => {
                    trace!("transport reached end of stream");
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    trace!(bytes = n, "read from transport");
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
