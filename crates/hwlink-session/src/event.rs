use std::sync::Arc;
use std::time::SystemTime;

use hwlink_registry::{Message, WireMessage};

/// One decoded device message, as delivered to listeners.
///
/// Every listener registered during a fan-out pass receives its own clone of
/// the same event; the message itself is shared and never mutated.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    header_code: u16,
    sequence: u64,
    received_at: SystemTime,
    message: Arc<dyn Message>,
}

impl DeviceEvent {
    /// Wrap a decoded message, stamping it with the current time.
    pub fn new(header_code: u16, sequence: u64, message: Arc<dyn Message>) -> Self {
        Self {
            header_code,
            sequence,
            received_at: SystemTime::now(),
            message,
        }
    }

    /// Header code of the frame the message arrived in.
    pub fn header_code(&self) -> u16 {
        self.header_code
    }

    /// Position of this event in the session's decode order, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the reader thread decoded the message.
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// The decoded message.
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// The decoded message as a shared handle.
    pub fn shared_message(&self) -> &Arc<dyn Message> {
        &self.message
    }

    /// Registered name of the message type.
    pub fn message_name(&self) -> &'static str {
        self.message.message_name()
    }

    /// Downcast the message to a concrete type.
    pub fn downcast_ref<M: WireMessage>(&self) -> Option<&M> {
        self.message().downcast_ref::<M>()
    }

    /// Whether the message is of type `M`.
    pub fn is<M: WireMessage>(&self) -> bool {
        self.message().is::<M>()
    }
}
