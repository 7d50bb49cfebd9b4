//! Async client for Labnode PID controller boards.
//!
//! Labnodes are network-attached PID controllers. This crate bundles the
//! layers needed to talk to one:
//!
//! # Crate Structure
//!
//! - [`transport`]: Opens the byte stream to a device (TCP, serial behind `serial`)
//! - [`frame`]: Checksummed, sequence-numbered wire frames
//! - [`client`]: Request correlation, timeouts, reconnection and typed device operations
//!
//! ```no_run
//! use labnode::client::{connect_device, ClientConfig};
//!
//! # async fn demo() -> labnode::client::Result<()> {
//! let pid = connect_device(ClientConfig::tcp("192.168.1.20", 4223)).await?;
//! println!("firmware {}", pid.get_software_version().await?);
//! pid.set_setpoint(0x0001_0000).await?;
//! pid.close().await;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use labnode_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use labnode_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use labnode_client::*;
}
