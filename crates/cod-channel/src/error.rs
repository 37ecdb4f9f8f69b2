use cod_transport::TransportError;

use crate::channel::Direction;

/// Malformed wire data, or a message that cannot be put on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message header contains an invalid magic number.
    #[error("invalid message magic (expected \"CD\")")]
    InvalidMagic,

    /// A message or body exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The stream ended with bytes that do not form a complete message.
    #[error("stream ended inside a message ({buffered} bytes left over)")]
    Truncated { buffered: usize },

    /// A declared-length body ended early.
    #[error("body shorter than declared ({available} of {expected} bytes)")]
    ShortBody { expected: usize, available: usize },

    /// A header line or body is not followed by CRLF.
    #[error("missing CRLF terminator")]
    MissingTerminator,

    /// A header line grew past the configured limit without a terminator.
    #[error("header line exceeds {max} bytes")]
    LineTooLong { max: usize },

    /// A header line contains no keyword.
    #[error("empty command line")]
    EmptyLine,

    /// A body length is not a non-negative integer.
    #[error("invalid body length {0:?}")]
    InvalidBodyLength(String),

    /// A body-bearing command lacks the argument position that holds its length.
    #[error("`{keyword}` carries its body length at argument {index}, but has {found} arguments")]
    MissingBodyLength {
        keyword: String,
        index: usize,
        found: usize,
    },

    /// A body-bearing command was given no body.
    #[error("`{keyword}` requires a body")]
    MissingBody { keyword: String },

    /// A body was attached to a command that does not take one.
    #[error("`{keyword}` does not take a body")]
    UnexpectedBody { keyword: String },

    /// A keyword or argument cannot be rendered as a single header token.
    #[error("token {0:?} is empty or contains whitespace")]
    InvalidToken(String),
}

/// The pluggable serializer failed to encode or decode an object graph.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Raised by third-party serializers.
    #[error("{0}")]
    Custom(String),
}

/// Everything a [`Serializer`](crate::Serializer) can fail with.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Errors returned by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The operation needs the direction this instance is not dedicated to.
    #[error("cannot {operation}: channel is dedicated to {dedicated}")]
    Direction {
        operation: &'static str,
        dedicated: Direction,
    },

    /// Writing would discard input that `waiting()` already pulled into this
    /// undedicated instance.
    #[error("cannot {operation}: input read ahead by waiting() is still buffered")]
    BufferedInput { operation: &'static str },

    /// No message is buffered and every writer has closed.
    #[error("end of stream: no message left and all writers are closed")]
    EndOfStream,

    /// The instance was closed.
    #[error("channel is closed")]
    Closed,

    /// The side this operation needs was released by every other holder
    /// before this instance was resolved.
    #[error("the {side} side of this transport has already been released")]
    Released { side: Direction },

    /// The read timeout from [`ChannelConfig`](crate::ChannelConfig) elapsed.
    #[error("no message within {0:?}")]
    Timeout(std::time::Duration),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed wire data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The serializer failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// An identifier does not name a transport reachable from this context.
    #[error("cannot resolve identifier for transport {key}: {reason}")]
    Unresolvable { key: u64, reason: &'static str },
}

impl ChannelError {
    /// True for failures of the communication itself (as opposed to misuse
    /// or bad data): end-of-stream, closed or released sides, timeouts and
    /// transport faults.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            ChannelError::EndOfStream
                | ChannelError::Closed
                | ChannelError::Released { .. }
                | ChannelError::Timeout(_)
                | ChannelError::Transport(_)
        )
    }
}

impl From<CodecError> for ChannelError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(err) => ChannelError::Protocol(err),
            CodecError::Serialization(err) => ChannelError::Serialization(err),
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
