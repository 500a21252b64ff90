//! Header-code to message-type registry for device messages.
//!
//! Every frame on the wire carries a 16-bit header code naming the concrete
//! message type of its payload. The [`MessageRegistry`] maps header codes to
//! decoders and message types back to header codes and encoders.
//!
//! Registration happens once, before the registry is shared with a session;
//! it is read-only afterwards.

pub mod catalog;
pub mod error;
pub mod message;
pub mod registry;

pub use error::{PayloadError, RegistryError, Result};
pub use message::{Message, WireMessage};
pub use registry::{DecodeFn, EncodeFn, MessageRegistry, RegistryEntry};
