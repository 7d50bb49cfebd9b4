/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size. Nothing was encoded.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic {found:02x?} (expected 0x4c4e \"LN\")")]
    InvalidMagic { found: [u8; 2] },

    /// The declared payload length exceeds the configured maximum.
    #[error("declared frame length {size} exceeds max {max}")]
    LengthTooLarge { size: usize, max: usize },

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch (frame 0x{received:04x}, computed 0x{computed:04x})")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the byte stream is desynchronized and the link must be dropped.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMagic { .. }
                | FrameError::LengthTooLarge { .. }
                | FrameError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
