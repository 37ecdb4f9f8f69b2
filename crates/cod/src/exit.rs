use std::fmt;
use std::io;

use cod_beanstalk::BeanstalkError;
use cod_channel::{ChannelError, CodecError, ProtocolError};
use cod_transport::TransportError;

// Exit codes follow the sysexits/timeout(1) conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    match err {
        CodecError::Protocol(err) => protocol_error(context, err),
        CodecError::Serialization(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Protocol(err) => protocol_error(context, err),
        ChannelError::Serialization(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ChannelError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::EndOfStream | ChannelError::Closed | ChannelError::Released { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ChannelError::Direction { .. }
        | ChannelError::BufferedInput { .. }
        | ChannelError::Unresolvable { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}

pub fn beanstalk_error(context: &str, err: BeanstalkError) -> CliError {
    match err {
        BeanstalkError::Io(err) => io_error(context, err),
        BeanstalkError::Protocol(err) => protocol_error(context, err),
        BeanstalkError::Channel(err) => channel_error(context, err),
        BeanstalkError::UnexpectedReply { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}
