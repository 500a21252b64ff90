use std::path::PathBuf;

use hwlink_frame::FrameError;
use hwlink_registry::RegistryError;
use hwlink_transport::TransportError;

use crate::listener::ListenerId;

/// Errors that can occur in session and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `connect` was called on a session that is already connected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// The operation needs a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// The listener is already part of a listener set.
    #[error("listener {0} is already registered")]
    AlreadyRegistered(ListenerId),

    /// The listener is not part of this session's listener set.
    #[error("listener {0} is not registered")]
    NotRegistered(ListenerId),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// Header-code resolution or payload (de)serialization failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The reader thread could not be started.
    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration document could not be parsed.
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Whether this error reports a misuse of the API rather than a failure
    /// of the device or the link. These are never worth retrying.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadyConnected
                | SessionError::NotConnected
                | SessionError::AlreadyRegistered(_)
                | SessionError::NotRegistered(_)
        )
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Registry(err) => SessionError::Registry(err),
            other => SessionError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
