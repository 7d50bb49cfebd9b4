use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::function::Status;

/// Frame header: magic (2) + sequence (1) + function (1) + status (1) + length (2) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Trailing CRC-16.
pub const CHECKSUM_SIZE: usize = 2;

/// Magic bytes: "LN" (0x4C 0x4E).
pub const MAGIC: [u8; 2] = [0x4C, 0x4E];

/// Default maximum payload size: 1 KiB. The firmware buffers are smaller than that.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// One wire frame, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlates a response with its request.
    pub sequence: u8,
    /// The device function addressed by this frame.
    pub function: u8,
    /// Device status. Always `0` on requests.
    pub status: u8,
    /// The opaque payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sequence: u8, function: u8, status: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            function,
            status,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }
}

/// A request as issued to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub sequence: u8,
    pub function: u8,
    pub payload: Bytes,
}

impl Request {
    pub fn new(sequence: u8, function: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            function,
            payload: payload.into(),
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(self.sequence, self.function, Status::OK.0, self.payload)
    }
}

impl From<Frame> for Request {
    fn from(frame: Frame) -> Self {
        Self {
            sequence: frame.sequence,
            function: frame.function,
            payload: frame.payload,
        }
    }
}

/// A response as sent back by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub sequence: u8,
    pub function: u8,
    pub status: Status,
    pub payload: Bytes,
}

impl Response {
    pub fn into_frame(self) -> Frame {
        Frame::new(self.sequence, self.function, self.status.0, self.payload)
    }
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        Self {
            sequence: frame.sequence,
            function: frame.function,
            status: Status(frame.status),
            payload: frame.payload,
        }
    }
}

/// Reject payloads the codec cannot represent under `max_payload`.
pub fn check_payload_len(len: usize, max_payload: usize) -> Result<()> {
    let max = max_payload.min(u16::MAX as usize);
    if len > max {
        return Err(FrameError::PayloadTooLarge { size: len, max });
    }
    Ok(())
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────┬───────────┬───────────┬─────────────┬─────────────┬────────────┐
/// │ Magic (2B) │ Seq (1B) │ Func (1B) │ Stat (1B) │ Len (2B LE) │ Payload     │ CRC16 (2B) │
/// │ 0x4C 0x4E  │          │           │           │             │ (Len bytes) │ (LE)       │
/// └────────────┴──────────┴───────────┴───────────┴─────────────┴─────────────┴────────────┘
/// ```
///
/// The checksum is CRC-16/CCITT-FALSE over everything before it.
pub fn encode_frame(frame: &Frame, max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    check_payload_len(frame.payload.len(), max_payload)?;

    let start = dst.len();
    dst.reserve(frame.wire_size());
    dst.put_slice(&MAGIC);
    dst.put_u8(frame.sequence);
    dst.put_u8(frame.function);
    dst.put_u8(frame.status);
    dst.put_u16_le(frame.payload.len() as u16);
    dst.put_slice(&frame.payload);
    let crc = crc16_ccitt_false(&dst[start..]);
    dst.put_u16_le(crc);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly the frame bytes from the buffer.
/// Magic, length and checksum errors leave the buffer untouched; the stream
/// is desynchronized at that point and should be dropped.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < MAGIC.len() {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic {
            found: [src[0], src[1]],
        });
    }

    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let payload_len = u16::from_le_bytes([src[5], src[6]]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::LengthTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let body_len = HEADER_SIZE + payload_len;
    let total = body_len + CHECKSUM_SIZE;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None); // Need more data
    }

    let received = u16::from_le_bytes([src[body_len], src[body_len + 1]]);
    let computed = crc16_ccitt_false(&src[..body_len]);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    let sequence = src[2];
    let function = src[3];
    let status = src[4];
    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(CHECKSUM_SIZE);

    Ok(Some(Frame {
        sequence,
        function,
        status,
        payload,
    }))
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.
pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
