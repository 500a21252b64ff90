use std::path::Path;
use std::time::Duration;

use hwlink_frame::{FrameConfig, MagicCheck, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};

/// Tunables for a device session.
///
/// Stored as JSON with snake_case keys; every field is
/// optional in a config document and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Events buffered per listener. Default: 32.
    pub queue_capacity: usize,
    /// Behaviour when a listener queue is full. Default: block.
    pub overflow_policy: OverflowPolicy,
    /// Largest accepted payload in bytes, inbound and outbound. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Reject frames whose marker is not "##". Default: true.
    pub verify_magic: bool,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Socket read timeout in milliseconds. The reader thread treats an
    /// elapsed timeout as "no data yet", not as an error.
    pub read_timeout_ms: Option<u64>,
    /// Socket write timeout in milliseconds.
    pub write_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Block,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            verify_magic: true,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SessionError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(SessionError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_payload_size == 0 || self.max_payload_size > u32::MAX as usize {
            return Err(SessionError::InvalidConfig(format!(
                "max_payload_size must be between 1 and {}",
                u32::MAX
            )));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(SessionError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    /// Set the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the per-listener queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Connect timeout, if configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Read timeout, if configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Write timeout, if configured.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Frame codec settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            magic: if self.verify_magic {
                MagicCheck::Verify
            } else {
                MagicCheck::Ignore
            },
            read_timeout: self.read_timeout(),
            write_timeout: self.write_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert!(config.verify_magic);
        assert!(config.validate().is_ok());

        let frame = config.frame_config();
        assert_eq!(frame.magic, MagicCheck::Verify);
        assert_eq!(frame.max_payload_size, DEFAULT_MAX_PAYLOAD);
        assert!(frame.read_timeout.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = SessionConfig::from_json(
            r#"{"overflow_policy":"drop-oldest","read_timeout_ms":250,"verify_magic":false}"#,
        )
        .unwrap();

        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.frame_config().magic, MagicCheck::Ignore);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SessionConfig::from_json(r#"{"queue_size":4}"#).unwrap_err();
        assert!(matches!(err, SessionError::ConfigParse(_)));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = SessionConfig::from_json(r#"{"queue_capacity":0}"#).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(ref msg) if msg.contains("queue_capacity")));

        let err = SessionConfig::from_json(r#"{"write_timeout_ms":0}"#).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(ref msg) if msg.contains("write_timeout_ms")));
    }

    #[test]
    fn from_file_reads_json() {
        let path = std::env::temp_dir().join(format!(
            "hwlink-config-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(&path, r#"{"overflow_policy":"error","queue_capacity":8}"#).unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.overflow_policy, OverflowPolicy::Error);
        assert_eq!(config.queue_capacity, 8);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SessionConfig::from_file("/nonexistent/hwlink.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hwlink.json"));
    }

    #[test]
    fn roundtrips_through_json() {
        let config = SessionConfig::default().with_overflow_policy(OverflowPolicy::Error);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""overflow_policy":"error""#));
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }
}
