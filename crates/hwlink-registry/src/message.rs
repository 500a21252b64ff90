use std::any::Any;
use std::fmt;

use crate::error::PayloadError;

/// A concrete device message type that can cross the wire.
///
/// Implementors define how their payload bytes look; the frame header is
/// handled by the codec.
pub trait WireMessage: fmt::Debug + Send + Sync + Sized + 'static {
    /// Type name used in diagnostics.
    const NAME: &'static str;

    /// Serialize the message into its payload bytes.
    fn encode_payload(&self) -> Result<Vec<u8>, PayloadError>;

    /// Parse a message from payload bytes.
    fn decode_payload(payload: &[u8]) -> Result<Self, PayloadError>;
}

/// Object-safe view of a decoded message.
///
/// Decoded messages are shared as `Arc<dyn Message>` across listener queues,
/// so the trait only offers read access.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// Access the concrete value for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete message type.
    fn message_name(&self) -> &'static str;
}

impl<M: WireMessage> Message for M {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn message_name(&self) -> &'static str {
        M::NAME
    }
}

impl dyn Message {
    /// Downcast to a concrete message type.
    pub fn downcast_ref<M: WireMessage>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Whether the message is of concrete type `M`.
    pub fn is<M: WireMessage>(&self) -> bool {
        self.as_any().is::<M>()
    }
}
