use std::fmt;
use std::time::Duration;

/// Why a link went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close()` was called, or the client was dropped.
    Closed,
    /// The device closed the connection (EOF).
    RemoteClosed,
    /// The byte stream was corrupted.
    Framing(String),
    /// A socket read or write failed.
    Io(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => f.write_str("closed locally"),
            DisconnectReason::RemoteClosed => f.write_str("closed by device"),
            DisconnectReason::Framing(detail) => write!(f, "corrupted stream: {detail}"),
            DisconnectReason::Io(detail) => write!(f, "i/o failure: {detail}"),
        }
    }
}

/// Lifecycle and diagnostic events, published on a broadcast channel.
///
/// Obtain a receiver with `LabnodeClient::subscribe()`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `connect()` established a link.
    Connected { endpoint: String },
    /// The link went down; all outstanding calls failed.
    Disconnected { reason: DisconnectReason },
    /// The reconnect policy restored the link.
    Reconnected { attempt: u32 },
    /// A reconnect attempt failed. `next_delay` is `None` when the policy gave up.
    ReconnectFailed {
        attempt: u32,
        error: String,
        next_delay: Option<Duration>,
    },
    /// A response matched no outstanding call and was dropped.
    UnmatchedResponse { sequence: u8, function: u8 },
}
