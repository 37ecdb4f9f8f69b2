use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cod_transport::{Stream, StreamKind};
use tracing::{debug, warn};

use crate::error::{ChannelError, Result};
use crate::identifier::Identifier;
use crate::reader::Inbound;
use crate::serializer::Serializer;
use crate::writer::Outbound;

/// One direction of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Lifecycle of a channel instance.
///
/// ```text
///                  get ┌───────────────┐
///           ┌─────────▶│ ReadDedicated │──┐
/// ┌─────────┴───┐      └───────────────┘  │ close
/// │ Undedicated │                         ├───────▶ Closed
/// └─────────┬───┘      ┌────────────────┐ │
///           └─────────▶│ WriteDedicated │─┘
///                  put └────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Undedicated,
    ReadDedicated,
    WriteDedicated,
    Closed,
}

/// Per-channel behaviour settings.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Upper bound for each blocking wait inside `get`. `None` blocks until
    /// data arrives or every writer is gone.
    pub read_timeout: Option<Duration>,
}

/// A message channel over a shared transport.
///
/// Each instance holds a reference to the transport's read side and one to
/// its write side. The first `get` drops the write reference and the first
/// `put` drops the read reference; the OS handle of a side closes once the
/// last instance in this process lets go of it. Forked children inherit the
/// handles and dedicate their own copies independently.
pub struct Channel<S: Serializer> {
    read: Option<Arc<Stream>>,
    write: Option<Arc<Stream>>,
    state: State,
    serializer: S,
    config: ChannelConfig,
    identifier: Identifier,
    owner_pid: u32,
    inbound: Inbound<S::Item>,
    outbound: Outbound,
}

impl<S: Serializer> Channel<S> {
    pub(crate) fn from_parts(
        read: Option<Arc<Stream>>,
        write: Option<Arc<Stream>>,
        identifier: Identifier,
        serializer: S,
        config: ChannelConfig,
    ) -> Self {
        Self {
            read,
            write,
            state: State::Undedicated,
            serializer,
            config,
            identifier,
            owner_pid: std::process::id(),
            inbound: Inbound::new(),
            outbound: Outbound::new(),
        }
    }

    /// Send one item, dedicating this instance to writing.
    pub fn put(&mut self, item: &S::Item) -> Result<()> {
        self.dedicate(Direction::Write, "put")?;
        let stream = self.write.as_deref().ok_or(ChannelError::Released {
            side: Direction::Write,
        })?;
        self.outbound.send(stream, &self.serializer, item)
    }

    /// Receive one item, dedicating this instance to reading.
    ///
    /// Blocks until a complete message is available. Once every writer has
    /// closed and nothing is buffered, fails with
    /// [`ChannelError::EndOfStream`].
    pub fn get(&mut self) -> Result<S::Item> {
        self.dedicate(Direction::Read, "get")?;
        let stream = self.read.as_deref().ok_or(ChannelError::Released {
            side: Direction::Read,
        })?;
        self.inbound
            .recv(stream, &self.serializer, self.config.read_timeout)
    }

    /// Like [`Channel::get`], but returns `Ok(None)` instead of blocking.
    pub fn try_get(&mut self) -> Result<Option<S::Item>> {
        self.dedicate(Direction::Read, "get")?;
        let stream = self.read.as_deref().ok_or(ChannelError::Released {
            side: Direction::Read,
        })?;
        self.inbound.try_recv(stream, &self.serializer)
    }

    /// Whether a `get` would return a message right now without blocking.
    ///
    /// Never blocks and never dedicates the instance. Bytes the transport has
    /// ready are pulled into this instance's buffer, so probe on the instance
    /// you intend to read from: while that input is buffered, `put` on this
    /// instance fails with [`ChannelError::BufferedInput`] instead of
    /// dropping it, and [`Channel::duplicate`] does not carry it over.
    /// Reaching end-of-stream yields `false`.
    pub fn waiting(&mut self) -> Result<bool> {
        match self.state {
            State::Closed | State::WriteDedicated => return Ok(false),
            State::Undedicated | State::ReadDedicated => {}
        }
        match self.read.as_deref() {
            Some(stream) => self.inbound.probe(stream, &self.serializer),
            None => Ok(false),
        }
    }

    /// Half-close the transport for writing, then close this instance.
    ///
    /// Dropping the last writer of a TCP connection does not end the stream
    /// while other descriptors on it stay open (this process's read side,
    /// copies inherited by forked children). This does: the peer reads
    /// end-of-stream. It acts on the connection, so writes from every process
    /// sharing it fail afterwards. For pipes and memory transports it only
    /// closes this instance.
    pub fn shutdown_write(&mut self) -> Result<()> {
        self.dedicate(Direction::Write, "shutdown_write")?;
        let stream = self.write.as_deref().ok_or(ChannelError::Released {
            side: Direction::Write,
        })?;
        stream.shutdown_write()?;
        self.close();
        Ok(())
    }

    /// Release both sides. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.read = None;
        self.write = None;
        self.inbound.clear();
        self.state = State::Closed;
        debug!(key = self.identifier.key, "channel closed");
    }

    /// Identifier of the underlying transport, valid in any state.
    pub fn identifier(&self) -> Identifier {
        Identifier {
            pid: std::process::id(),
            ..self.identifier.clone()
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The direction this instance is dedicated to, if any.
    pub fn direction(&self) -> Option<Direction> {
        match self.state {
            State::ReadDedicated => Some(Direction::Read),
            State::WriteDedicated => Some(Direction::Write),
            State::Undedicated | State::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn kind(&self) -> StreamKind {
        match &self.identifier.endpoint {
            crate::Endpoint::Pipe { .. } => StreamKind::Pipe,
            crate::Endpoint::Tcp { .. } => StreamKind::Tcp,
            crate::Endpoint::Memory => StreamKind::Memory,
        }
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn dedicate(&mut self, direction: Direction, operation: &'static str) -> Result<()> {
        match (self.state, direction) {
            (State::Closed, _) => Err(ChannelError::Closed),
            (State::ReadDedicated, Direction::Read) | (State::WriteDedicated, Direction::Write) => {
                Ok(())
            }
            (State::ReadDedicated, Direction::Write) => Err(ChannelError::Direction {
                operation,
                dedicated: Direction::Read,
            }),
            (State::WriteDedicated, Direction::Read) => Err(ChannelError::Direction {
                operation,
                dedicated: Direction::Write,
            }),
            (State::Undedicated, Direction::Read) => {
                self.write = None;
                self.state = State::ReadDedicated;
                self.log_dedication(direction);
                Ok(())
            }
            (State::Undedicated, Direction::Write) => {
                if !self.inbound.is_empty() {
                    warn!(
                        key = self.identifier.key,
                        operation,
                        "refusing to write from a channel holding probed input"
                    );
                    return Err(ChannelError::BufferedInput { operation });
                }
                self.read = None;
                self.state = State::WriteDedicated;
                self.log_dedication(direction);
                Ok(())
            }
        }
    }

    fn log_dedication(&self, direction: Direction) {
        let pid = std::process::id();
        if pid == self.owner_pid {
            debug!(key = self.identifier.key, %direction, "channel dedicated");
        } else {
            debug!(
                key = self.identifier.key,
                %direction,
                owner_pid = self.owner_pid,
                pid,
                "inherited channel dedicated"
            );
        }
    }
}

impl<S: Serializer + Clone> Channel<S> {
    /// A new undedicated instance on the same transport.
    ///
    /// Only undedicated instances can be duplicated: a dedicated one has
    /// already released the other side.
    pub fn duplicate(&self) -> Result<Self> {
        match self.state {
            State::Undedicated => {}
            State::Closed => return Err(ChannelError::Closed),
            State::ReadDedicated => {
                return Err(ChannelError::Direction {
                    operation: "duplicate",
                    dedicated: Direction::Read,
                })
            }
            State::WriteDedicated => {
                return Err(ChannelError::Direction {
                    operation: "duplicate",
                    dedicated: Direction::Write,
                })
            }
        }

        debug!(key = self.identifier.key, "channel duplicated");
        Ok(Self::from_parts(
            self.read.clone(),
            self.write.clone(),
            self.identifier.clone(),
            self.serializer.clone(),
            self.config.clone(),
        ))
    }

    /// Split into a reader and a writer, consuming this instance.
    ///
    /// Input already pulled in by `waiting()` moves to the reader.
    pub fn split(mut self) -> Result<(Self, Self)> {
        let mut reader = self.duplicate()?;
        std::mem::swap(&mut reader.inbound, &mut self.inbound);
        reader.dedicate(Direction::Read, "split")?;
        self.dedicate(Direction::Write, "split")?;
        Ok((reader, self))
    }
}

impl<S: Serializer> fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state)
            .field("transport", &self.identifier.transport_name())
            .field("key", &self.identifier.key)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::context::Context;
    use crate::error::{CodecError, SerializationError};
    use crate::serializer::JsonSerializer;

    fn memory_channel(ctx: &Context) -> Channel<JsonSerializer<String>> {
        ctx.memory(JsonSerializer::new())
    }

    #[test]
    fn starts_undedicated() {
        let ctx = Context::new();
        let chan = memory_channel(&ctx);
        assert_eq!(chan.state(), State::Undedicated);
        assert_eq!(chan.direction(), None);
        assert_eq!(chan.kind(), StreamKind::Memory);
    }

    #[test]
    fn put_dedicates_to_write() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        let reader = chan.duplicate().unwrap();

        chan.put(&"x".to_string()).unwrap();
        assert_eq!(chan.state(), State::WriteDedicated);
        let err = chan.get().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Direction {
                operation: "get",
                dedicated: Direction::Write
            }
        ));
        drop(reader);
    }

    #[test]
    fn get_dedicates_to_read() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        chan.duplicate().unwrap().put(&"x".to_string()).unwrap();

        assert_eq!(chan.get().unwrap(), "x");
        assert_eq!(chan.state(), State::ReadDedicated);
        let err = chan.put(&"y".to_string()).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Direction {
                operation: "put",
                dedicated: Direction::Read
            }
        ));
    }

    #[test]
    fn try_get_dedicates_too() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        let _writer = chan.duplicate().unwrap();
        assert!(chan.try_get().unwrap().is_none());
        assert_eq!(chan.direction(), Some(Direction::Read));
    }

    #[test]
    fn close_is_idempotent() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        chan.close();
        chan.close();
        assert!(chan.is_closed());
        assert!(matches!(chan.get(), Err(ChannelError::Closed)));
        assert!(matches!(chan.put(&"x".into()), Err(ChannelError::Closed)));
        assert!(matches!(chan.duplicate(), Err(ChannelError::Closed)));
        assert!(!chan.waiting().unwrap());
    }

    #[test]
    fn duplicate_requires_undedicated() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        let mut reader = chan.duplicate().unwrap();
        chan.put(&"x".to_string()).unwrap();
        assert!(matches!(
            chan.duplicate(),
            Err(ChannelError::Direction {
                operation: "duplicate",
                dedicated: Direction::Write
            })
        ));

        reader.get().unwrap();
        assert!(matches!(
            reader.duplicate(),
            Err(ChannelError::Direction {
                dedicated: Direction::Read,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_leaves_original_untouched() {
        let ctx = Context::new();
        let chan = memory_channel(&ctx);
        let dup = chan.duplicate().unwrap();
        assert_eq!(chan.state(), State::Undedicated);
        assert_eq!(dup.state(), State::Undedicated);
        assert_eq!(chan.identifier(), dup.identifier());
    }

    #[test]
    fn split_returns_dedicated_ends() {
        let ctx = Context::new();
        let (mut reader, mut writer) = memory_channel(&ctx).split().unwrap();
        assert_eq!(reader.direction(), Some(Direction::Read));
        assert_eq!(writer.direction(), Some(Direction::Write));

        writer.put(&"through".to_string()).unwrap();
        assert_eq!(reader.get().unwrap(), "through");
    }

    #[test]
    fn waiting_on_writer_is_false() {
        let ctx = Context::new();
        let (_reader, mut writer) = memory_channel(&ctx).split().unwrap();
        writer.put(&"x".to_string()).unwrap();
        assert!(!writer.waiting().unwrap());
    }

    #[test]
    fn put_refuses_to_drop_probed_input() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        chan.duplicate().unwrap().put(&"first".to_string()).unwrap();
        assert!(chan.waiting().unwrap());

        let err = chan.put(&"second".to_string()).unwrap_err();
        assert!(matches!(err, ChannelError::BufferedInput { operation: "put" }));
        assert!(!err.is_communication());
        assert_eq!(chan.state(), State::Undedicated);
        assert_eq!(chan.get().unwrap(), "first");
    }

    #[test]
    fn split_hands_probed_input_to_reader() {
        let ctx = Context::new();
        let mut chan = memory_channel(&ctx);
        let mut writer = chan.duplicate().unwrap();
        writer.put(&"early".to_string()).unwrap();
        writer.close();

        assert!(chan.waiting().unwrap());
        let (mut reader, mut tx) = chan.split().unwrap();
        assert_eq!(reader.get().unwrap(), "early");
        tx.put(&"late".to_string()).unwrap();
        assert_eq!(reader.get().unwrap(), "late");
    }

    #[test]
    fn shutdown_write_closes_the_instance() {
        let ctx = Context::new();
        let (mut reader, mut writer) = memory_channel(&ctx).split().unwrap();
        writer.put(&"last".to_string()).unwrap();
        writer.shutdown_write().unwrap();
        assert!(writer.is_closed());
        assert!(matches!(
            writer.shutdown_write(),
            Err(ChannelError::Closed)
        ));

        assert_eq!(reader.get().unwrap(), "last");
        assert!(matches!(reader.get(), Err(ChannelError::EndOfStream)));
    }

    #[test]
    fn identifier_reports_current_process() {
        let ctx = Context::new();
        let chan = memory_channel(&ctx);
        assert_eq!(chan.identifier().pid, std::process::id());
    }

    /// Serializer double that records calls and answers with a canned item.
    #[derive(Clone, Default)]
    struct Recording {
        encoded: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl Serializer for Recording {
        type Item = String;

        fn encode(&self, item: &String, dst: &mut BytesMut) -> std::result::Result<(), CodecError> {
            self.encoded.borrow_mut().push(item.clone());
            dst.extend_from_slice(b"serialized");
            Ok(())
        }

        fn decode(&self, src: &mut BytesMut) -> std::result::Result<Option<String>, CodecError> {
            if src.len() < 10 {
                return Ok(None);
            }
            if &src[..10] != b"serialized" {
                return Err(SerializationError::Custom("unexpected bytes".into()).into());
            }
            let _ = src.split_to(10);
            Ok(Some("return".to_string()))
        }
    }

    #[test]
    fn custom_serializer_is_used_both_ways() {
        let ctx = Context::new();
        let ser = Recording::default();
        let (mut reader, mut writer) = ctx.memory(ser.clone()).split().unwrap();

        writer.put(&"the_man".to_string()).unwrap();
        assert_eq!(reader.get().unwrap(), "return");
        assert_eq!(ser.encoded.borrow().as_slice(), ["the_man".to_string()]);
    }
}
