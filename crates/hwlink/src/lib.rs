//! Framed message link to hardware devices.
//!
//! hwlink talks to a device over a byte stream using `"##"`-marked,
//! length-prefixed frames tagged with a message header code, and fans decoded
//! messages out to any number of listeners.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transports (TCP, Unix sockets)
//! - [`registry`]: header-code to message-type registry and the device message catalog
//! - [`frame`]: frame codec and blocking frame/message readers and writers
//! - [`session`]: connected sessions, listener queues and the reader thread (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use hwlink_transport::*;
}

/// Re-export registry types.
pub mod registry {
    pub use hwlink_registry::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hwlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use hwlink_session::*;
}
