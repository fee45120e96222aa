//! Per-connection sizing and negotiated precision.

use crate::error::SyncError;
use crate::msg::{FRAME_HEADER_LEN, TERMINATOR_LEN};
use serde::{Deserialize, Serialize};

/// Entity numbers are 15 bits on the wire.
pub const WIRE_MAX_ENTITIES: usize = 0x8000;

/// Negotiated numeric precision of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Every width is available: float origins far from the world centre and
    /// 16-bit angles unless the entity asks for low precision.
    #[default]
    Standard,
    /// Older or bandwidth-starved peers: compact origins and 8-bit angles only.
    Low,
}

impl Precision {
    /// Whether 32-bit float origins may be written.
    pub fn allows_float_origin(self) -> bool {
        matches!(self, Precision::Standard)
    }

    /// Whether 16-bit angles may be written.
    pub fn allows_wide_angles(self) -> bool {
        matches!(self, Precision::Standard)
    }
}

/// Sizing of one connection's database and packets.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Entity slots; numbers run 1..max_entities.
    pub max_entities: usize,
    /// Maximum unacknowledged packets remembered for loss recovery.
    pub packet_log_capacity: usize,
    /// Maximum entity records in a single packet.
    pub max_commit_entries: usize,
    /// Byte budget of one outgoing entity frame.
    pub max_packet_size: usize,
    /// Negotiated precision.
    pub precision: Precision,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_entities: 8192,
            packet_log_capacity: 64,
            max_commit_entries: 256,
            max_packet_size: 1400,
            precision: Precision::Standard,
        }
    }
}

impl SyncConfig {
    /// Reject sizes the database cannot work with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_entities < 2 || self.max_entities > WIRE_MAX_ENTITIES {
            return Err(SyncError::InvalidConfig(format!(
                "max_entities must be in 2..={WIRE_MAX_ENTITIES}, got {}",
                self.max_entities
            )));
        }
        if self.packet_log_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "packet_log_capacity must be > 0".into(),
            ));
        }
        if self.max_commit_entries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_commit_entries must be > 0".into(),
            ));
        }
        let overhead = FRAME_HEADER_LEN + TERMINATOR_LEN;
        if self.max_packet_size <= overhead {
            return Err(SyncError::InvalidConfig(format!(
                "max_packet_size must exceed the {overhead}-byte frame overhead, got {}",
                self.max_packet_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SyncConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn rejects_oversized_entity_table() {
        let config = SyncConfig {
            max_entities: WIRE_MAX_ENTITIES + 1,
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_packet_smaller_than_overhead() {
        let config = SyncConfig {
            max_packet_size: 8,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            max_packet_size = 512
            precision = "low"
            "#,
        )
        .expect("parse");
        assert_eq!(config.max_packet_size, 512);
        assert_eq!(config.precision, Precision::Low);
        assert_eq!(config.packet_log_capacity, 64);
    }
}
