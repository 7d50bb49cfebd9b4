//! Async client for Labnode PID controller boards.
//!
//! One [`LabnodeClient`] owns one link to a device. Requests are correlated
//! with their responses by sequence number, so any number of tasks can share
//! the client:
//!
//! - [`LabnodeClient::execute`] sends a request and waits for its response,
//!   a timeout, or loss of the link, whichever comes first.
//! - An optional reconnect policy restores a dropped link with exponential
//!   backoff; progress is published as [`ClientEvent`]s.
//! - [`LabnodeClient::scoped`] closes the link on every exit path.
//!
//! [`PidController`] wraps the client with typed device operations.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod event;
mod pending;

pub use backoff::Backoff;
pub use client::LabnodeClient;
pub use config::{ClientConfig, ReconnectConfig, DEFAULT_SEQUENCE_SPACE, MAX_SEQUENCE_SPACE};
pub use connection::{Connection, ConnectionState};
pub use device::{
    connect_device, humidity_from_raw, identify, temperature_from_raw, DeviceIdentity, DeviceKind,
    FeedbackDirection, PidController, Version,
};
pub use dispatcher::{Dispatcher, FrameSink, LinkHandler};
pub use error::{ClientError, Result};
pub use event::{ClientEvent, DisconnectReason};
