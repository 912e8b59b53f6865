use super::crc::crc32;

/// Size of the `type` + `length` header.
pub const FRAME_HEADER_LENGTH: usize = 4;
/// Size of the CRC trailer.
pub const FRAME_CRC_LENGTH: usize = 4;
/// Header plus trailer; a frame is never shorter than this.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_LENGTH + FRAME_CRC_LENGTH;
/// Largest payload the 16-bit length field can announce.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// 16-bit frame type carried in the first two bytes of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(pub u16);

impl FrameType {
    pub const DISCOVER_REQUEST: FrameType = FrameType(0x0002);
    pub const DISCOVER_REPLY: FrameType = FrameType(0x0003);
    pub const GETSET_REQUEST: FrameType = FrameType(0x0004);
    pub const GETSET_REPLY: FrameType = FrameType(0x0005);

    /// The type a peer answers this request with.
    pub fn reply(self) -> FrameType {
        FrameType(self.0.wrapping_add(1))
    }
}

/// Outcome of [`open_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeResult<'a> {
    /// Not enough bytes yet for the declared frame.
    Incomplete,
    /// The CRC trailer does not match the frame contents.
    Invalid,
    /// A complete, CRC-checked frame.
    Frame(FrameType, &'a [u8]),
}

/// Wrap `payload` into a `[type][length][payload][crc32]` frame.
///
/// The header fields are big-endian; the CRC is stored low byte first.
/// Callers keep `payload` within [`MAX_FRAME_PAYLOAD`].
pub fn seal_frame(payload: &[u8], frame_type: FrameType) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_FRAME_PAYLOAD);

    let mut buffer = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    buffer.extend_from_slice(&frame_type.0.to_be_bytes());
    buffer.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buffer.extend_from_slice(payload);

    let crc = crc32(&buffer);
    buffer.extend_from_slice(&crc.to_le_bytes());
    buffer
}

/// Decode a frame from the first `length` bytes of `bytes`.
pub fn open_frame(bytes: &[u8], length: usize) -> FrameDecodeResult<'_> {
    let bytes = &bytes[..length.min(bytes.len())];
    if bytes.len() < FRAME_HEADER_LENGTH {
        return FrameDecodeResult::Incomplete;
    }

    let frame_type = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
    let payload_len = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
    if payload_len + FRAME_OVERHEAD > bytes.len() {
        return FrameDecodeResult::Incomplete;
    }

    let crc_offset = FRAME_HEADER_LENGTH + payload_len;
    let expected = crc32(&bytes[..crc_offset]);
    let actual = u32::from_le_bytes(bytes[crc_offset..crc_offset + FRAME_CRC_LENGTH].try_into().unwrap());
    if expected != actual {
        return FrameDecodeResult::Invalid;
    }

    FrameDecodeResult::Frame(FrameType(frame_type), &bytes[FRAME_HEADER_LENGTH..crc_offset])
}
