//! Length-prefixed, type-tagged framing for device messages.
//!
//! Every message is framed with:
//! - A 2-byte magic marker ("##") for stream synchronization
//! - A 2-byte big-endian header code naming the message type
//! - A 4-byte big-endian payload length
//!
//! [`FrameReader`] and [`FrameWriter`] move raw frames over blocking streams;
//! [`MessageReader`] and [`MessageWriter`] add header-code resolution through a
//! [`MessageRegistry`](hwlink_registry::MessageRegistry).

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_frame, encode_frame, expected_frame_len, frame_header, Frame, FrameConfig, MagicCheck,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use message::{Decoded, MessageReader, MessageWriter};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::DeviceCodec;
