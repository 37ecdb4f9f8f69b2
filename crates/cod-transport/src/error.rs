/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The OS refused to create an anonymous pipe.
    #[error("failed to create pipe: {0}")]
    Pipe(std::io::Error),

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// A descriptor named for reattachment is not open in this process.
    #[error("descriptor {fd} is not open in this process")]
    StaleHandle { fd: i32 },

    /// A descriptor named for reattachment is open but refers to something
    /// other than the transport it was recorded for.
    #[error("descriptor {fd} is not {expected}")]
    Mismatch { fd: i32, expected: String },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
