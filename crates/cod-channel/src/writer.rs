use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use cod_transport::Stream;
use tracing::trace;

use crate::error::{ChannelError, Result};
use crate::serializer::Serializer;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Send state of one channel instance: a reusable encode buffer.
pub(crate) struct Outbound {
    buf: BytesMut,
}

impl Outbound {
    pub(crate) fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Encode `item` and write it completely (blocking).
    pub(crate) fn send<S: Serializer>(
        &mut self,
        stream: &Stream,
        serializer: &S,
        item: &S::Item,
    ) -> Result<()> {
        if self.buf.capacity() == 0 {
            self.buf.reserve(INITIAL_BUFFER_CAPACITY);
        }
        self.buf.clear();
        serializer.encode(item, &mut self.buf)?;

        let mut writer: &Stream = stream;
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match writer.write(&self.buf[offset..]) {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::from(err)),
            }
        }
        trace!(bytes = offset, "wrote message");

        loop {
            match writer.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::from(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use cod_transport::memory_pipe;

    use super::*;
    use crate::error::ProtocolError;
    use crate::serializer::JsonSerializer;

    #[test]
    fn send_writes_encoded_message() {
        let duplex = memory_pipe();
        let ser = JsonSerializer::<u8>::new();
        let mut outbound = Outbound::new();

        outbound.send(&duplex.write, &ser, &5).unwrap();
        drop(duplex.write);

        let mut wire = Vec::new();
        (&duplex.read).read_to_end(&mut wire).unwrap();
        assert_eq!(wire, b"CD\x01\x00\x00\x005");
    }

    #[test]
    fn buffer_is_reused_between_messages() {
        let duplex = memory_pipe();
        let ser = JsonSerializer::<u8>::new();
        let mut outbound = Outbound::new();

        outbound.send(&duplex.write, &ser, &1).unwrap();
        outbound.send(&duplex.write, &ser, &2).unwrap();
        drop(duplex.write);

        let mut wire = BytesMut::new();
        let mut raw = Vec::new();
        (&duplex.read).read_to_end(&mut raw).unwrap();
        wire.extend_from_slice(&raw);
        assert_eq!(ser.decode(&mut wire).unwrap(), Some(1));
        assert_eq!(ser.decode(&mut wire).unwrap(), Some(2));
    }

    #[test]
    fn encode_failure_writes_nothing() {
        let duplex = memory_pipe();
        let ser = JsonSerializer::<String>::with_max_message_size(1);
        let mut outbound = Outbound::new();

        let err = outbound
            .send(&duplex.write, &ser, &"long".to_string())
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Protocol(ProtocolError::MessageTooLarge { .. })
        ));

        assert!(!duplex
            .read
            .poll_readable(Some(std::time::Duration::ZERO))
            .unwrap());
    }

    #[test]
    fn broken_pipe_is_a_transport_error() {
        let duplex = memory_pipe();
        drop(duplex.read);
        let ser = JsonSerializer::<u8>::new();
        let mut outbound = Outbound::new();

        let err = outbound.send(&duplex.write, &ser, &1).unwrap_err();
        assert!(err.is_communication());
    }
}
