use std::time::Duration;

use labnode_frame::{ErrorCode, FrameError, FunctionId};
use labnode_transport::TransportError;

/// Errors surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The link to the device could not be established.
    #[error("connect failed: {0}")]
    Connect(#[from] TransportError),

    /// The client is not connected.
    #[error("not connected")]
    NotConnected,

    /// The request cannot be represented on the wire. Nothing was sent.
    #[error("cannot encode request: {0}")]
    Encoding(FrameError),

    /// No response arrived before the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The link dropped while the request was outstanding. Stream corruption
    /// drops the link too, so it also surfaces here.
    #[error("connection lost while the request was outstanding")]
    ConnectionLost,

    /// The device answered with an error status.
    #[error("device reported error status {code} ({})", describe_status(.code))]
    Device { code: u8 },

    /// The response payload does not have the shape the function returns.
    #[error("invalid payload for {function:?}: expected {expected} bytes, got {actual}")]
    InvalidPayload {
        function: FunctionId,
        expected: usize,
        actual: usize,
    },

    /// The device type is not known to this client.
    #[error("unsupported device type {0}")]
    UnsupportedDevice(u8),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether re-issuing the request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::ConnectionLost)
    }

    /// The firmware error code, for device errors.
    pub fn device_error(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Device { code } => ErrorCode::from_u8(*code),
            _ => None,
        }
    }
}

fn describe_status(code: &u8) -> String {
    match ErrorCode::from_u8(*code) {
        Some(known) => known.to_string(),
        None => "unknown".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
