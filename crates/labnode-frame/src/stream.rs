use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::FrameError;

/// `tokio_util` codec over the Labnode frame format.
///
/// Use with `FramedRead`/`FramedWrite` to get complete frames from a byte
/// stream; partial reads are buffered internally.
#[derive(Debug, Clone, Copy)]
pub struct LabnodeCodec {
    max_payload: usize,
}

impl LabnodeCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for LabnodeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for LabnodeCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        decode_frame(src, self.max_payload)
    }
}

impl Encoder<Frame> for LabnodeCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&frame, self.max_payload, dst)
    }
}
