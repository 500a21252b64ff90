use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{PayloadError, RegistryError, Result};
use crate::message::{Message, WireMessage};

/// Type-erased payload decoder.
pub type DecodeFn = fn(&[u8]) -> std::result::Result<Arc<dyn Message>, PayloadError>;

/// Type-erased payload encoder.
pub type EncodeFn = fn(&dyn Message) -> std::result::Result<Vec<u8>, PayloadError>;

/// One registered message type.
#[derive(Clone)]
pub struct RegistryEntry {
    header_code: u16,
    name: &'static str,
    type_id: TypeId,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl RegistryEntry {
    /// Header code carried by frames of this type.
    pub fn header_code(&self) -> u16 {
        self.header_code
    }

    /// Message type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type registered for this entry.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Parse a payload into a shared message.
    pub fn decode(&self, payload: &[u8]) -> Result<Arc<dyn Message>> {
        (self.decode)(payload).map_err(|source| self.payload_error(source))
    }

    /// Serialize a message of this entry's type.
    pub fn encode(&self, message: &dyn Message) -> Result<Vec<u8>> {
        (self.encode)(message).map_err(|source| self.payload_error(source))
    }

    fn payload_error(&self, source: PayloadError) -> RegistryError {
        RegistryError::Payload {
            header_code: self.header_code,
            name: self.name,
            source,
        }
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("header_code", &self.header_code)
            .field("name", &self.name)
            .finish()
    }
}

/// Bidirectional header-code / message-type table.
#[derive(Debug, Default, Clone)]
pub struct MessageRegistry {
    by_code: HashMap<u16, RegistryEntry>,
    by_type: HashMap<TypeId, u16>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register message type `M` under `header_code`.
    ///
    /// Header codes are unique and each type gets exactly one code.
    pub fn register<M: WireMessage>(&mut self, header_code: u16) -> Result<()> {
        if let Some(existing) = self.by_code.get(&header_code) {
            return Err(RegistryError::DuplicateHeaderCode {
                header_code,
                existing: existing.name,
            });
        }
        let type_id = TypeId::of::<M>();
        if let Some(&existing_code) = self.by_type.get(&type_id) {
            return Err(RegistryError::DuplicateMessageType {
                name: M::NAME,
                header_code: existing_code,
            });
        }

        self.by_code.insert(
            header_code,
            RegistryEntry {
                header_code,
                name: M::NAME,
                type_id,
                decode: decode_as::<M>,
                encode: encode_as::<M>,
            },
        );
        self.by_type.insert(type_id, header_code);
        debug!(header_code, name = M::NAME, "registered message type");
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<M: WireMessage>(mut self, header_code: u16) -> Result<Self> {
        self.register::<M>(header_code)?;
        Ok(self)
    }

    /// Look up the entry (and decoder) for a header code.
    pub fn resolve(&self, header_code: u16) -> Result<&RegistryEntry> {
        self.by_code
            .get(&header_code)
            .ok_or(RegistryError::UnknownHeaderCode(header_code))
    }

    /// Header code registered for the message's concrete type.
    pub fn header_code_for(&self, message: &dyn Message) -> Result<u16> {
        self.by_type
            .get(&Any::type_id(message.as_any()))
            .copied()
            .ok_or_else(|| RegistryError::UnregisteredMessageType(message.message_name()))
    }

    /// Header code registered for type `M`.
    pub fn header_code_of<M: WireMessage>(&self) -> Result<u16> {
        self.by_type
            .get(&TypeId::of::<M>())
            .copied()
            .ok_or(RegistryError::UnregisteredMessageType(M::NAME))
    }

    /// Resolve the header code and serialize the payload of `message`.
    pub fn encode(&self, message: &dyn Message) -> Result<(u16, Vec<u8>)> {
        let header_code = self.header_code_for(message)?;
        let entry = self.resolve(header_code)?;
        let payload = entry.encode(message)?;
        Ok((header_code, payload))
    }

    /// Resolve `header_code` and parse `payload`.
    pub fn decode(&self, header_code: u16, payload: &[u8]) -> Result<Arc<dyn Message>> {
        self.resolve(header_code)?.decode(payload)
    }

    /// Type name registered for a header code.
    pub fn name_for(&self, header_code: u16) -> Option<&'static str> {
        self.by_code.get(&header_code).map(|entry| entry.name)
    }

    /// Whether a header code is registered.
    pub fn contains(&self, header_code: u16) -> bool {
        self.by_code.contains_key(&header_code)
    }

    /// All registered header codes, ascending.
    pub fn header_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.by_code.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn decode_as<M: WireMessage>(payload: &[u8]) -> std::result::Result<Arc<dyn Message>, PayloadError> {
    let message: Arc<dyn Message> = Arc::new(M::decode_payload(payload)?);
    Ok(message)
}

fn encode_as<M: WireMessage>(message: &dyn Message) -> std::result::Result<Vec<u8>, PayloadError> {
    match message.as_any().downcast_ref::<M>() {
        Some(message) => message.encode_payload(),
        None => Err(PayloadError::Invalid(format!(
            "expected {}, got {}",
            M::NAME,
            message.message_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Blob(Vec<u8>);

    impl WireMessage for Blob {
        const NAME: &'static str = "Blob";

        fn encode_payload(&self) -> std::result::Result<Vec<u8>, PayloadError> {
            Ok(self.0.clone())
        }

        fn decode_payload(payload: &[u8]) -> std::result::Result<Self, PayloadError> {
            Ok(Self(payload.to_vec()))
        }
    }

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    impl WireMessage for Counter {
        const NAME: &'static str = "Counter";

        fn encode_payload(&self) -> std::result::Result<Vec<u8>, PayloadError> {
            Ok(self.0.to_be_bytes().to_vec())
        }

        fn decode_payload(payload: &[u8]) -> std::result::Result<Self, PayloadError> {
            let bytes: [u8; 4] = payload
                .try_into()
                .map_err(|_| PayloadError::Invalid(format!("expected 4 bytes, got {}", payload.len())))?;
            Ok(Self(u32::from_be_bytes(bytes)))
        }
    }

    #[derive(Debug)]
    struct Stranger;

    impl WireMessage for Stranger {
        const NAME: &'static str = "Stranger";

        fn encode_payload(&self) -> std::result::Result<Vec<u8>, PayloadError> {
            Ok(Vec::new())
        }

        fn decode_payload(_payload: &[u8]) -> std::result::Result<Self, PayloadError> {
            Ok(Self)
        }
    }

    fn registry() -> MessageRegistry {
        MessageRegistry::new()
            .with::<Blob>(1)
            .unwrap()
            .with::<Counter>(2)
            .unwrap()
    }

    #[test]
    fn header_code_bijection() {
        let registry = registry();
        for code in registry.header_codes() {
            let entry = registry.resolve(code).unwrap();
            assert_eq!(entry.header_code(), code);
        }
        assert_eq!(registry.header_code_for(&Blob(vec![])).unwrap(), 1);
        assert_eq!(registry.header_code_for(&Counter(0)).unwrap(), 2);
        assert_eq!(registry.header_code_of::<Counter>().unwrap(), 2);
        assert_eq!(registry.name_for(1), Some("Blob"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let registry = registry();
        let (code, payload) = registry.encode(&Counter(0xDEAD_BEEF)).unwrap();
        assert_eq!(code, 2);
        assert_eq!(payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);

        let decoded = registry.decode(code, &payload).unwrap();
        assert_eq!(decoded.downcast_ref::<Counter>(), Some(&Counter(0xDEAD_BEEF)));
        assert!(decoded.is::<Counter>());
        assert!(!decoded.is::<Blob>());
        assert_eq!(decoded.message_name(), "Counter");
    }

    #[test]
    fn unknown_header_code() {
        let registry = registry();
        assert!(matches!(
            registry.resolve(99),
            Err(RegistryError::UnknownHeaderCode(99))
        ));
        assert!(!registry.contains(99));
    }

    #[test]
    fn unregistered_message_type() {
        let registry = registry();
        assert!(matches!(
            registry.encode(&Stranger),
            Err(RegistryError::UnregisteredMessageType("Stranger"))
        ));
    }

    #[test]
    fn duplicate_header_code_rejected() {
        let mut registry = registry();
        let err = registry.register::<Stranger>(1).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateHeaderCode {
                header_code: 1,
                existing: "Blob"
            }
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_message_type_rejected() {
        let mut registry = registry();
        let err = registry.register::<Blob>(7).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateMessageType {
                name: "Blob",
                header_code: 1
            }
        ));
        assert!(!registry.contains(7));
    }

    #[test]
    fn malformed_payload_reports_type() {
        let registry = registry();
        let err = registry.decode(2, &[0x01, 0x02]).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Payload {
                header_code: 2,
                name: "Counter",
                ..
            }
        ));
    }

    #[test]
    fn entry_encode_rejects_foreign_type() {
        let registry = registry();
        let entry = registry.resolve(2).unwrap();
        assert!(entry.encode(&Blob(vec![1])).is_err());
    }
}
