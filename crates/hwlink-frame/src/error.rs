use hwlink_registry::RegistryError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header does not start with the magic marker.
    #[error("frame sync lost: expected magic 0x2323 \"##\", found {found:02x?}")]
    FrameSync { found: [u8; 2] },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a frame.
    #[error("truncated frame (expected {expected} bytes, received {received})")]
    Truncated { expected: usize, received: usize },

    /// A frame was cut off after part of it reached the device, so the
    /// outbound stream no longer starts on a frame boundary.
    #[error("frame write aborted after {written} of {expected} bytes; stream out of sync")]
    IncompleteWrite { written: usize, expected: usize },

    /// Header-code resolution or payload (de)serialization failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FrameError {
    /// Whether a reader loop must stop after this error.
    ///
    /// Registry failures only affect the one frame they occurred on, and the
    /// frame has already been consumed from the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::FrameSync { .. }
                | FrameError::PayloadTooLarge { .. }
                | FrameError::IncompleteWrite { .. }
                | FrameError::Io(_)
        )
    }

    /// Whether the stream has ended (cleanly or mid-frame).
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            FrameError::ConnectionClosed | FrameError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
