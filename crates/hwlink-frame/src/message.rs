use std::io::{Read, Write};
use std::sync::Arc;

use hwlink_registry::{Message, MessageRegistry};
use tracing::{debug, trace};

use crate::codec::FrameConfig;
use crate::error::Result;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// A message decoded from one frame.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Header code the frame carried.
    pub header_code: u16,
    /// The decoded message, shared read-only.
    pub message: Arc<dyn Message>,
}

/// Reads frames and resolves them into registered messages.
pub struct MessageReader<R> {
    frames: FrameReader<R>,
    registry: Arc<MessageRegistry>,
}

impl<R: Read> MessageReader<R> {
    /// Wrap a stream with default frame configuration.
    pub fn new(inner: R, registry: Arc<MessageRegistry>) -> Self {
        Self::from_frames(FrameReader::new(inner), registry)
    }

    /// Wrap a stream with explicit frame configuration.
    pub fn with_config(inner: R, config: FrameConfig, registry: Arc<MessageRegistry>) -> Self {
        Self::from_frames(FrameReader::with_config(inner, config), registry)
    }

    /// Wrap an existing frame reader.
    pub fn from_frames(frames: FrameReader<R>, registry: Arc<MessageRegistry>) -> Self {
        Self { frames, registry }
    }

    /// Read and decode the next message (blocking).
    ///
    /// The whole frame is consumed before its header code is resolved, so an
    /// unknown header code or a malformed payload leaves the stream aligned on
    /// the next frame.
    pub fn read_message(&mut self) -> Result<Decoded> {
        let frame = self.frames.read_frame()?;
        trace!(
            header_code = frame.header_code,
            len = frame.payload.len(),
            "frame received"
        );

        let entry = self.registry.resolve(frame.header_code)?;
        let message = entry.decode(&frame.payload)?;
        debug!("< {}", entry.name());

        Ok(Decoded {
            header_code: frame.header_code,
            message,
        })
    }

    /// Registry used for header-code resolution.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Borrow the underlying frame reader.
    pub fn frames(&self) -> &FrameReader<R> {
        &self.frames
    }

    /// Consume and return the underlying frame reader.
    pub fn into_frames(self) -> FrameReader<R> {
        self.frames
    }
}

/// Encodes registered messages and writes them as frames.
pub struct MessageWriter<W> {
    frames: FrameWriter<W>,
    registry: Arc<MessageRegistry>,
}

impl<W: Write> MessageWriter<W> {
    /// Wrap a stream with default frame configuration.
    pub fn new(inner: W, registry: Arc<MessageRegistry>) -> Self {
        Self::from_frames(FrameWriter::new(inner), registry)
    }

    /// Wrap a stream with explicit frame configuration.
    pub fn with_config(inner: W, config: FrameConfig, registry: Arc<MessageRegistry>) -> Self {
        Self::from_frames(FrameWriter::with_config(inner, config), registry)
    }

    /// Wrap an existing frame writer.
    pub fn from_frames(frames: FrameWriter<W>, registry: Arc<MessageRegistry>) -> Self {
        Self { frames, registry }
    }

    /// Encode `message`, write its frame and flush.
    ///
    /// Returns the header code used.
    pub fn send(&mut self, message: &dyn Message) -> Result<u16> {
        let (header_code, payload) = self.registry.encode(message)?;
        debug!("> {}", message.message_name());
        self.frames.send(header_code, &payload)?;
        Ok(header_code)
    }

    /// Borrow the underlying frame writer.
    pub fn frames(&self) -> &FrameWriter<W> {
        &self.frames
    }

    /// Consume and return the underlying frame writer.
    pub fn into_frames(self) -> FrameWriter<W> {
        self.frames
    }
}
