use std::time::Duration;

/// Errors that can occur while opening or using a device link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The connection attempt did not finish in time.
    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// The endpoint kind is not compiled into this build.
    #[error("unsupported endpoint {endpoint}: {reason}")]
    Unsupported {
        endpoint: String,
        reason: &'static str,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether retrying the same endpoint later can succeed.
    ///
    /// A rebooting device can refuse, reset or vanish for a while, so connect
    /// failures count as transient unless the endpoint itself is unusable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
                    | std::io::ErrorKind::Unsupported
            ),
            TransportError::Timeout { .. } | TransportError::Io(_) => true,
            TransportError::Unsupported { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
