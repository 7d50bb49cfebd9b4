use std::fmt;

use serde::{Deserialize, Serialize};

/// Default TCP port of the Labnode ethernet interface.
pub const DEFAULT_PORT: u16 = 4223;

/// Default baud rate of the Labnode USB serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Where a Labnode device can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// A TCP socket, usually the board's ethernet port.
    Tcp { host: String, port: u16 },
    /// A serial TTY like `/dev/ttyACM0` or `COM3`.
    Serial {
        tty: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

impl Endpoint {
    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Serial endpoint at the default baud rate.
    pub fn serial(tty: impl Into<String>) -> Self {
        Self::Serial {
            tty: tty.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::tcp("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Serial { tty, baud_rate } => write!(f, "{tty}@{baud_rate}"),
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
