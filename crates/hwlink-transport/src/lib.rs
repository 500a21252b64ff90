//! Byte-stream transports for hardware device links.
//!
//! A transport opens a bidirectional byte stream to a device and hands back
//! independent read and write halves:
//! - TCP sockets (device emulators, network-attached devices)
//! - Unix domain sockets (local bridges, Linux/macOS)
//!
//! This is the lowest layer of hwlink. Everything else builds on top of
//! the [`DeviceStream`] type and the [`Transport`] trait provided here.
//! [`Endpoint`] picks a transport from an address string.

pub mod endpoint;
pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, UNIX_PREFIX};
pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::{DeviceStream, StreamPair, Transport};

#[cfg(unix)]
pub use uds::UnixTransport;
