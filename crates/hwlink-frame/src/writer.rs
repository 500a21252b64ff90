use std::io::{self, ErrorKind, IoSlice, Write};

use hwlink_transport::DeviceStream;
use tracing::{trace, warn};

use crate::codec::{frame_header, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes frames to a device stream.
///
/// The header and payload go out together as one vectored write, without
/// copying the payload, and every frame is flushed before `send` returns.
///
/// If a write fails after part of a frame has been accepted, the device is
/// left mid-frame. The writer then refuses every further frame with
/// [`FrameError::IncompleteWrite`]; the owner has to reconnect.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
    frames_written: u64,
    aborted: Option<(usize, usize)>,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            frames_written: 0,
            aborted: None,
        }
    }

    /// Write a complete frame and flush.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.header_code, frame.payload.as_ref())
    }

    /// Frame `payload` under `header_code`, write it and flush.
    ///
    /// Payloads over the configured maximum are refused before anything is
    /// written. A device that hangs up before taking any byte of the frame
    /// yields [`FrameError::ConnectionClosed`].
    pub fn send(&mut self, header_code: u16, payload: &[u8]) -> Result<()> {
        if let Some((written, expected)) = self.aborted {
            return Err(FrameError::IncompleteWrite { written, expected });
        }
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let header = frame_header(header_code, payload.len())?;
        self.write_wire(&header, payload)?;
        self.flush()?;

        self.frames_written += 1;
        trace!(header_code, len = payload.len(), "frame sent");
        Ok(())
    }

    fn write_wire(&mut self, header: &[u8; HEADER_SIZE], payload: &[u8]) -> Result<()> {
        let expected = HEADER_SIZE + payload.len();
        let mut slices = [IoSlice::new(header), IoSlice::new(payload)];
        let mut pending: &mut [IoSlice<'_>] = &mut slices;
        let mut written = 0usize;

        while written < expected {
            match self.inner.write_vectored(pending) {
                Ok(0) => return Err(self.abort(written, expected, None)),
                Ok(n) => {
                    written += n;
                    IoSlice::advance_slices(&mut pending, n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(self.abort(written, expected, Some(err))),
            }
        }
        Ok(())
    }

    fn abort(&mut self, written: usize, expected: usize, source: Option<io::Error>) -> FrameError {
        if written == 0 {
            return match source {
                None => FrameError::ConnectionClosed,
                Some(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
                    ) =>
                {
                    FrameError::ConnectionClosed
                }
                Some(err) => FrameError::Io(err),
            };
        }

        warn!(written, expected, error = ?source, "device stream left mid-frame");
        self.aborted = Some((written, expected));
        FrameError::IncompleteWrite { written, expected }
    }

    /// Flush the underlying stream, retrying interrupted flushes.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Frames fully written and flushed so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Whether the stream still starts on a frame boundary.
    pub fn is_in_sync(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<DeviceStream> {
    /// Writer for a device stream, applying the configured write timeout.
    pub fn with_config_device(inner: DeviceStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
