/// Errors produced while serializing or parsing one message payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The payload is not valid JSON for the message type.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload violates a message-specific rule.
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Errors that can occur in registry lookups and registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No message type is registered for the header code.
    #[error("unknown header code {0} (0x{0:04x})")]
    UnknownHeaderCode(u16),

    /// The message's concrete type was never registered.
    #[error("unregistered message type {0}")]
    UnregisteredMessageType(&'static str),

    /// The header code is already taken by another message type.
    #[error("header code {header_code} already registered for {existing}")]
    DuplicateHeaderCode {
        header_code: u16,
        existing: &'static str,
    },

    /// The message type is already registered under a header code.
    #[error("message type {name} already registered with header code {header_code}")]
    DuplicateMessageType {
        name: &'static str,
        header_code: u16,
    },

    /// Payload (de)serialization failed for a resolved message type.
    #[error("malformed {name} payload (header code {header_code}): {source}")]
    Payload {
        header_code: u16,
        name: &'static str,
        #[source]
        source: PayloadError,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
