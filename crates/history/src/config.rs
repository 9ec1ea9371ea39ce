//! History service configuration.

use cadenza_core::sequence::SEQ_NUM_BITS;
use cadenza_ports::PortsError;
use serde::{Deserialize, Serialize};

/// Tunables for timer sequencing and shard ownership.
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Schedule-to-start timeout used when an activity asks for none (seconds).
    pub default_schedule_to_start_timeout_secs: i32,
    /// Schedule-to-close timeout used when an activity asks for none (seconds).
    pub default_schedule_to_close_timeout_secs: i32,
    /// Start-to-close timeout used when an activity asks for none (seconds).
    pub default_start_to_close_timeout_secs: i32,
    /// Size of one shard sequence block, as a power of two.
    pub range_size_bits: u32,
    /// Transfer tasks fetched per read.
    pub transfer_batch_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_schedule_to_start_timeout_secs: 10,
            default_schedule_to_close_timeout_secs: 10,
            default_start_to_close_timeout_secs: 10,
            range_size_bits: 20,
            transfer_batch_size: 100,
        }
    }
}

/// Low bits of the range id kept in a timer tie-break above the block offset.
const RANGE_TAG_BITS: u32 = 6;

/// Widest block whose offsets plus the range tag still fit the tie-break.
const MAX_RANGE_SIZE_BITS: u32 = SEQ_NUM_BITS - RANGE_TAG_BITS;

impl HistoryConfig {
    /// Check field ranges.
    pub fn validate(&self) -> Result<(), PortsError> {
        for (name, value) in [
            (
                "default_schedule_to_start_timeout_secs",
                self.default_schedule_to_start_timeout_secs,
            ),
            (
                "default_schedule_to_close_timeout_secs",
                self.default_schedule_to_close_timeout_secs,
            ),
            (
                "default_start_to_close_timeout_secs",
                self.default_start_to_close_timeout_secs,
            ),
        ] {
            if value <= 0 {
                return Err(PortsError::invalid_argument(format!(
                    "{name} must be greater than 0, got {value}"
                )));
            }
        }
        if self.range_size_bits == 0 || self.range_size_bits > MAX_RANGE_SIZE_BITS {
            return Err(PortsError::invalid_argument(format!(
                "range_size_bits must be in 1..={MAX_RANGE_SIZE_BITS}, got {}",
                self.range_size_bits
            )));
        }
        if self.transfer_batch_size == 0 {
            return Err(PortsError::invalid_argument(
                "transfer_batch_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Build from `CADENZA_*` environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, PortsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let defaults = Self::default();

        config.default_schedule_to_start_timeout_secs = parse_var(
            &lookup,
            "CADENZA_DEFAULT_SCHEDULE_TO_START_SECS",
            defaults.default_schedule_to_start_timeout_secs,
        );
        config.default_schedule_to_close_timeout_secs = parse_var(
            &lookup,
            "CADENZA_DEFAULT_SCHEDULE_TO_CLOSE_SECS",
            defaults.default_schedule_to_close_timeout_secs,
        );
        config.default_start_to_close_timeout_secs = parse_var(
            &lookup,
            "CADENZA_DEFAULT_START_TO_CLOSE_SECS",
            defaults.default_start_to_close_timeout_secs,
        );
        config.range_size_bits =
            parse_var(&lookup, "CADENZA_RANGE_SIZE_BITS", defaults.range_size_bits);
        config.transfer_batch_size = parse_var(
            &lookup,
            "CADENZA_TRANSFER_BATCH_SIZE",
            defaults.transfer_batch_size,
        );

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable config variable");
            default
        }),
        None => default,
    }
}
