use std::fmt;
use std::io;

use labnode_client::ClientError;
use labnode_transport::TransportError;

pub const SUCCESS: i32 = 0;
#[allow(dead_code)]
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// The device answered with an error status.
pub const DEVICE_ERROR: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            let mapped = io_error(context, source);
            CliError::new(mapped.code, format!("{context}: {err}"))
        }
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Unsupported { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match &err {
        ClientError::Connect(source) => transport_error(context, source),
        ClientError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::NotConnected | ClientError::ConnectionLost => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        ClientError::Encoding(_)
        | ClientError::InvalidPayload { .. }
        | ClientError::UnsupportedDevice(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ClientError::Device { .. } => CliError::new(DEVICE_ERROR, format!("{context}: {err}")),
        ClientError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn refused_connect_is_a_transport_failure() {
        let err = ClientError::Connect(TransportError::Connect {
            endpoint: "127.0.0.1:4223".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        });
        let mapped = client_error("connect failed", err);
        assert_eq!(mapped.code, TRANSPORT_ERROR);
        assert!(mapped.message.starts_with("connect failed: "));
    }

    #[test]
    fn request_outcomes_have_distinct_codes() {
        assert_eq!(
            client_error("x", ClientError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(client_error("x", ClientError::Device { code: 250 }).code, DEVICE_ERROR);
        assert_eq!(client_error("x", ClientError::ConnectionLost).code, TRANSPORT_ERROR);
        assert_eq!(client_error("x", ClientError::Config("bad".into())).code, USAGE);
    }
}
