use std::path::PathBuf;

/// Errors that can occur in device transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The configured device address is unusable.
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    /// Failed to connect to a TCP endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to a Unix domain socket.
    #[error("failed to connect to {path}: {source}")]
    ConnectPath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// `open_stream` was called while a stream is already open.
    #[error("transport stream is already open")]
    AlreadyOpen,

    /// `close` was called without an open stream.
    #[error("transport stream is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, TransportError>;
