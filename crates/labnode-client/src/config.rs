use std::path::Path;
use std::time::Duration;

use labnode_frame::DEFAULT_MAX_PAYLOAD;
use labnode_transport::Endpoint;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Sequence numbers the firmware keeps in its request-id pool (0..=23).
pub const DEFAULT_SEQUENCE_SPACE: u16 = 24;

/// Largest sequence space a one-byte sequence number allows.
pub const MAX_SEQUENCE_SPACE: u16 = 256;

/// Client configuration.
///
/// Durations are stored in milliseconds when (de)serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the device is reached.
    pub endpoint: Endpoint,
    /// Timeout for each connection attempt.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Default deadline for `execute()` when the caller passes none.
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    /// Largest payload accepted in either direction.
    pub max_payload_size: usize,
    /// Number of distinct sequence numbers in use before wrapping.
    pub sequence_space: u16,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Automatic reconnection after an unexpected disconnect.
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout: Duration::from_millis(2500),
            request_timeout: Duration::from_millis(2500),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            sequence_space: DEFAULT_SEQUENCE_SPACE,
            event_capacity: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for a TCP endpoint with defaults for everything else.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::default().with_endpoint(Endpoint::tcp(host, port))
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the connection attempt timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the sequence space.
    pub fn with_sequence_space(mut self, space: u16) -> Self {
        self.sequence_space = space;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ClientError::Config(format!("reading {}: {err}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| ClientError::Config(format!("parsing config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config("connect timeout must be non-zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("request timeout must be non-zero".into()));
        }
        if self.sequence_space == 0 || self.sequence_space > MAX_SEQUENCE_SPACE {
            return Err(ClientError::Config(format!(
                "sequence space must be within 1..={MAX_SEQUENCE_SPACE}, got {}",
                self.sequence_space
            )));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::Config("event capacity must be non-zero".into()));
        }
        self.reconnect.validate()
    }
}

/// Exponential backoff settings for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Delay before the first attempt.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Maximum attempts per outage (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Enabled policy with default timings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(ClientError::Config("reconnect base delay must be non-zero".into()));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ClientError::Config(format!(
                "reconnect multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(ClientError::Config(
                "reconnect max delay must not be below the base delay".into(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
