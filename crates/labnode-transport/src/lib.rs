//! Byte stream transports for Labnode devices.
//!
//! Provides a unified async stream over the links a Labnode board exposes:
//! - TCP (the ethernet port, default port 4223)
//! - Serial TTY (USB CDC), behind the `serial` feature
//!
//! This is the lowest layer of labnode. Everything else builds on top of
//! the [`LabnodeStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::{Endpoint, DEFAULT_BAUD_RATE, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use stream::{open, LabnodeStream};
