use cod_channel::{ChannelError, CodecError, ProtocolError};

/// Errors that can occur talking to a beanstalkd server.
#[derive(Debug, thiserror::Error)]
pub enum BeanstalkError {
    /// I/O failure while pulling from a reader.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed command or reply.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The channel carrying the conversation failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The server answered with something the request does not allow.
    #[error("unexpected reply to `{command}`: {reply}")]
    UnexpectedReply { command: String, reply: String },
}

impl BeanstalkError {
    /// True if the server side went away or the transport failed.
    pub fn is_communication(&self) -> bool {
        match self {
            BeanstalkError::Io(_) => true,
            BeanstalkError::Channel(err) => err.is_communication(),
            BeanstalkError::Protocol(_) | BeanstalkError::UnexpectedReply { .. } => false,
        }
    }
}

impl From<CodecError> for BeanstalkError {
    fn from(err: CodecError) -> Self {
        BeanstalkError::Channel(err.into())
    }
}

pub type Result<T> = std::result::Result<T, BeanstalkError>;
