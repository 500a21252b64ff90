use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + header code (2) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "##" (0x23 0x23).
pub const MAGIC: [u8; 2] = *b"##";

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A framed payload tagged with its message header code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header code of the message type carried in `payload`.
    pub header_code: u16,
    /// The serialized message.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(header_code: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            header_code,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// What the decoder does with the two magic bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MagicCheck {
    /// Reject frames whose marker is not "##" with [`FrameError::FrameSync`].
    #[default]
    Verify,
    /// Read and discard the marker without looking at it.
    Ignore,
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Magic marker handling. Default: verify.
    pub magic: MagicCheck,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            magic: MagicCheck::Verify,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Header code  │ Length   │ Payload         │
/// │ 0x23 0x23    │ (2B BE)      │ (4B BE)  │ (Length bytes)  │
/// │ "##"         │              │          │                 │
/// └──────────────┴──────────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(header_code: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = frame_header(header_code, payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header);
    dst.put_slice(payload);
    Ok(())
}

/// The 8 header bytes announcing a payload of `payload_len` bytes.
///
/// Fails when the length does not fit the u32 length field.
pub fn frame_header(header_code: u16, payload_len: usize) -> Result<[u8; HEADER_SIZE]> {
    let len = u32::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge {
        size: payload_len,
        max: u32::MAX as usize,
    })?;
    let mut header = [0u8; HEADER_SIZE];
    header[..2].copy_from_slice(&MAGIC);
    header[2..4].copy_from_slice(&header_code.to_be_bytes());
    header[4..].copy_from_slice(&len.to_be_bytes());
    Ok(header)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if config.magic == MagicCheck::Verify && src[0..2] != MAGIC {
        return Err(FrameError::FrameSync {
            found: [src[0], src[1]],
        });
    }

    let header_code = u16::from_be_bytes([src[2], src[3]]);
    let payload_len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        header_code,
        payload,
    }))
}

/// Total wire length of the frame at the start of `src`, once its header is
/// buffered.
pub fn expected_frame_len(src: &[u8]) -> Option<usize> {
    if src.len() < HEADER_SIZE {
        return None;
    }
    let payload_len = usize::try_from(u32::from_be_bytes([src[4], src[5], src[6], src[7]])).ok()?;
    HEADER_SIZE.checked_add(payload_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_match_protocol() {
        let mut buf = BytesMut::new();
        encode_frame(0x0001, &[0x01, 0x02, 0x03, 0x04, 0x05], &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0x23, 0x23, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05]
        );

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.header_code, 1);
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_big_endian_fields() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; 0x0102];
        encode_frame(0xABCD, &payload, &mut buf).unwrap();

        assert_eq!(&buf[2..4], &[0xAB, 0xCD]);
        assert_eq!(&buf[4..8], &[0x00, 0x00, 0x01, 0x02]);
        assert_eq!(expected_frame_len(&buf), Some(HEADER_SIZE + 0x0102));
    }

    #[test]
    fn test_header_bytes_match_encoded_frame() {
        let header = frame_header(0x0011, 3).unwrap();
        assert_eq!(header, [0x23, 0x23, 0x00, 0x11, 0x00, 0x00, 0x00, 0x03]);

        let mut buf = BytesMut::new();
        encode_frame(0x0011, b"abc", &mut buf).unwrap();
        assert_eq!(&buf[..HEADER_SIZE], &header);
    }

    #[test]
    fn test_expected_len_of_largest_declared_payload() {
        let header = [0x23, 0x23, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF];
        let expected = usize::try_from(u32::MAX)
            .ok()
            .and_then(|len| HEADER_SIZE.checked_add(len));
        assert_eq!(expected_frame_len(&header), expected);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_header_rejects_length_beyond_u32() {
        let err = frame_header(1, u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x23, 0x23, 0x00][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(expected_frame_len(&buf), None);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2); // Truncate payload

        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_decode_bad_magic_loses_sync() {
        let mut buf = BytesMut::from(&[0x3F, 0x23, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default());
        assert!(matches!(
            result,
            Err(FrameError::FrameSync { found: [0x3F, 0x23] })
        ));
    }

    #[test]
    fn test_decode_ignores_magic_when_configured() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0xAA][..]);
        let cfg = FrameConfig {
            magic: MagicCheck::Ignore,
            ..FrameConfig::default()
        };
        let frame = decode_frame(&mut buf, &cfg).unwrap().unwrap();
        assert_eq!(frame.header_code, 7);
        assert_eq!(frame.payload.as_ref(), &[0xAA]);
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u16(1);
        buf.put_u32(1024 * 1024 * 32); // 32 MiB

        let result = decode_frame(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"first", &mut buf).unwrap();
        encode_frame(2, b"second", &mut buf).unwrap();
        let cfg = FrameConfig::default();

        let f1 = decode_frame(&mut buf, &cfg).unwrap().unwrap();
        assert_eq!(f1.header_code, 1);
        assert_eq!(f1.payload.as_ref(), b"first");

        let f2 = decode_frame(&mut buf, &cfg).unwrap().unwrap();
        assert_eq!(f2.header_code, 2);
        assert_eq!(f2.payload.as_ref(), b"second");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.header_code, 0);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
