//! Built-in device message catalog.
//!
//! A small set of session-management messages with JSON payloads. Header
//! codes follow the device protocol numbering. Applications with their own
//! message schemas build a [`MessageRegistry`] from their own types instead.

use serde::{Deserialize, Serialize};

use crate::error::{PayloadError, Result};
use crate::message::WireMessage;
use crate::registry::MessageRegistry;

/// Header code: [`Initialize`].
pub const INITIALIZE: u16 = 0;
/// Header code: [`Ping`].
pub const PING: u16 = 1;
/// Header code: [`Success`].
pub const SUCCESS: u16 = 2;
/// Header code: [`Failure`].
pub const FAILURE: u16 = 3;
/// Header code: [`Features`].
pub const FEATURES: u16 = 17;
/// Header code: [`Cancel`].
pub const CANCEL: u16 = 20;
/// Header code: [`ButtonRequest`].
pub const BUTTON_REQUEST: u16 = 26;
/// Header code: [`ButtonAck`].
pub const BUTTON_ACK: u16 = 27;

/// Reset the device session and request its [`Features`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialize {}

/// Liveness probe; the device answers with [`Success`] echoing `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generic positive response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generic negative response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Device identity and firmware version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub major_version: u32,
    #[serde(default)]
    pub minor_version: u32,
    #[serde(default)]
    pub patch_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub initialized: bool,
}

/// Abort the operation in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {}

/// The device waits for a physical button press.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

/// Acknowledge a [`ButtonRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonAck {}

// An empty payload is accepted as `{}` for every catalog type.
macro_rules! json_wire_message {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl WireMessage for $ty {
                const NAME: &'static str = stringify!($ty);

                fn encode_payload(&self) -> std::result::Result<Vec<u8>, PayloadError> {
                    Ok(serde_json::to_vec(self)?)
                }

                fn decode_payload(payload: &[u8]) -> std::result::Result<Self, PayloadError> {
                    if payload.is_empty() {
                        return Ok(serde_json::from_slice(b"{}")?);
                    }
                    Ok(serde_json::from_slice(payload)?)
                }
            }
        )+
    };
}

json_wire_message!(
    Initialize,
    Ping,
    Success,
    Failure,
    Features,
    Cancel,
    ButtonRequest,
    ButtonAck,
);

/// Register every catalog message into `registry`.
pub fn register_all(registry: &mut MessageRegistry) -> Result<()> {
    registry.register::<Initialize>(INITIALIZE)?;
    registry.register::<Ping>(PING)?;
    registry.register::<Success>(SUCCESS)?;
    registry.register::<Failure>(FAILURE)?;
    registry.register::<Features>(FEATURES)?;
    registry.register::<Cancel>(CANCEL)?;
    registry.register::<ButtonRequest>(BUTTON_REQUEST)?;
    registry.register::<ButtonAck>(BUTTON_ACK)?;
    Ok(())
}

/// A registry holding exactly the catalog messages.
pub fn registry() -> Result<MessageRegistry> {
    let mut registry = MessageRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
