//! Checksummed, sequence-numbered framing for the Labnode wire protocol.
//!
//! Every message is framed with:
//! - A 2-byte magic number ("LN") for stream synchronization
//! - A 1-byte sequence number used to correlate responses with requests
//! - A 1-byte function id and a 1-byte device status
//! - A 2-byte little-endian payload length
//! - A trailing CRC-16/CCITT-FALSE over header and payload
//!
//! Payloads are opaque here; interpreting them is up to the device layer.

pub mod codec;
pub mod error;
pub mod function;
#[cfg(feature = "async")]
pub mod stream;

pub use codec::{
    check_payload_len, crc16_ccitt_false, decode_frame, encode_frame, Frame, Request, Response,
    CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use function::{ErrorCode, FunctionId, Status};
#[cfg(feature = "async")]
pub use stream::LabnodeCodec;
