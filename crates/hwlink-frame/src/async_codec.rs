//! `tokio_util::codec` adapter for the device frame format.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, expected_frame_len, Frame, FrameConfig, HEADER_SIZE};
use crate::error::FrameError;

/// Frame codec for `FramedRead` / `FramedWrite` over async streams.
#[derive(Debug, Clone, Default)]
pub struct DeviceCodec {
    config: FrameConfig,
}

impl DeviceCodec {
    /// Create a codec with explicit configuration.
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for DeviceCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let frame = decode_frame(src, &self.config)?;
        if frame.is_none() {
            if let Some(total) = expected_frame_len(src) {
                src.reserve(total.saturating_sub(src.len()));
            }
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let received = src.len();
                let expected = expected_frame_len(src).unwrap_or(HEADER_SIZE);
                src.clear();
                Err(FrameError::Truncated { expected, received })
            }
        }
    }
}

impl Encoder<Frame> for DeviceCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(frame.header_code, &frame.payload, dst)
    }
}
