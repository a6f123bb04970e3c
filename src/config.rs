//! # Stage: Engine Configuration
//!
//! ## Responsibility
//! Holds every tunable of the engine: cache sizing and expiry, the
//! recommendation heuristics, completion score increments, the batch sender
//! retry policy, and the milestone thresholds. Every section deserializes from
//! TOML with `#[serde(default)]`, so a config file only needs the values it
//! overrides.
//!
//! ## Guarantees
//! - `EngineConfig::default()` reproduces the tuned production heuristics
//! - `validate()` rejects values that would make the cache or sender inert
//!
//! ## NOT Responsible For
//! - Catalog content (see [`crate::catalog`])

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Priority;
use crate::error::ConfigError;
use crate::milestone::MilestoneThresholds;

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Sizing and expiry for [`crate::cache::CacheStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum live entries before capacity eviction kicks in. Default: 50.
    pub capacity: usize,
    /// TTL applied by `set` when the caller does not pass one. Default: 300 s.
    pub default_ttl_secs: u64,
    /// Fraction of entries evicted when the store is full. Default: 0.2.
    pub eviction_fraction: f64,
    /// Interval of the background expiry sweep. Default: 120 s.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            default_ttl_secs: 300,
            eviction_fraction: 0.2,
            sweep_interval_secs: 120,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// RecommendConfig
// ---------------------------------------------------------------------------

/// Thresholds above which a user is treated as advanced. Any one suffices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedUserThresholds {
    /// Combined progress across all tools must exceed this.
    pub combined_tool_progress: u32,
    /// Resources accessed must exceed this.
    pub resources_accessed: u32,
    /// Mean competency score must exceed this.
    pub mean_competency: f64,
}

impl Default for AdvancedUserThresholds {
    fn default() -> Self {
        Self { combined_tool_progress: 100, resources_accessed: 10, mean_competency: 70.0 }
    }
}

/// Heuristics for [`crate::recommend::RecommendationEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// List length when the request does not set one. Default: 8.
    pub default_limit: usize,
    /// Maximum task-progression entries emitted per request. Default: 3.
    pub task_progression_limit: usize,
    /// TTL for catalog parts cached by `recommend_for`. Default: 600 s.
    pub catalog_ttl_secs: u64,
    /// Tool progress at which an export is expected. Default: 50.
    pub export_progress_threshold: u32,
    /// Resources accessed before practice is nudged. Default: 10.
    pub reading_without_practice_threshold: u32,
    /// Completions in a low-scoring domain before it counts as stalled. Default: 3.
    pub stalled_domain_min_completions: u32,
    pub advanced: AdvancedUserThresholds,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            default_limit: 8,
            task_progression_limit: 3,
            catalog_ttl_secs: 600,
            export_progress_threshold: 50,
            reading_without_practice_threshold: 10,
            stalled_domain_min_completions: 3,
            advanced: AdvancedUserThresholds::default(),
        }
    }
}

impl RecommendConfig {
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

/// Score added to a competency domain per completion, by task priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityIncrements {
    pub critical: u8,
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl Default for PriorityIncrements {
    fn default() -> Self {
        Self { critical: 8, high: 5, medium: 3, low: 1 }
    }
}

impl PriorityIncrements {
    pub fn for_priority(&self, priority: Priority) -> u8 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Behaviour of [`crate::tracker::CompletionTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub increments: PriorityIncrements,
    /// Capacity of the milestone-achieved broadcast channel. Default: 64.
    pub signal_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { increments: PriorityIncrements::default(), signal_channel_capacity: 64 }
    }
}

// ---------------------------------------------------------------------------
// SenderConfig
// ---------------------------------------------------------------------------

/// Retry and throttling policy of [`crate::tracker::BatchSender`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Maximum events per batch. Default: 5.
    pub batch_size: usize,
    /// Delivery attempts per event, including the first. Default: 3.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt. Default: 200 ms.
    pub backoff_base_ms: u64,
    /// Pause between consecutive batches. Default: 1000 ms.
    pub throttle_interval_ms: u64,
    /// Capacity of the delivery-failure broadcast channel. Default: 64.
    pub failure_channel_capacity: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 3,
            backoff_base_ms: 200,
            throttle_interval_ms: 1_000,
            failure_channel_capacity: 64,
        }
    }
}

impl SenderConfig {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub recommend: RecommendConfig,
    pub tracker: TrackerConfig,
    pub sender: SenderConfig,
    pub thresholds: MilestoneThresholds,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.capacity",
                reason: "must be greater than 0".into(),
            });
        }
        let f = self.cache.eviction_fraction;
        if !(f > 0.0 && f <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "cache.eviction_fraction",
                reason: format!("{f} is outside (0, 1]"),
            });
        }
        if self.sender.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "sender.batch_size",
                reason: "must be greater than 0".into(),
            });
        }
        if self.sender.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "sender.max_attempts",
                reason: "must be greater than 0".into(),
            });
        }
        if self.tracker.signal_channel_capacity == 0 || self.sender.failure_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel capacity",
                reason: "broadcast channels need capacity > 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_heuristics() {
        let c = EngineConfig::default();
        assert_eq!(c.cache.capacity, 50);
        assert_eq!(c.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(c.cache.sweep_interval(), Duration::from_secs(120));
        assert_eq!(c.recommend.default_limit, 8);
        assert_eq!(c.sender.batch_size, 5);
        assert_eq!(c.tracker.increments, PriorityIncrements {
            critical: 8,
            high: 5,
            medium: 3,
            low: 1,
        });
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let c = EngineConfig::from_toml_str("[cache]\ncapacity = 10\n").unwrap();
        assert_eq!(c.cache.capacity, 10);
        assert_eq!(c.cache.default_ttl_secs, 300);
        assert_eq!(c.sender, SenderConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = EngineConfig::from_toml_str("[cache]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cache.capacity", .. }));
    }

    #[test]
    fn test_eviction_fraction_out_of_range_rejected() {
        let err = EngineConfig::from_toml_str("[cache]\neviction_fraction = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cache.eviction_fraction", .. }));
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(matches!(EngineConfig::from_toml_str("[cache"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let s = SenderConfig { backoff_base_ms: 100, ..Default::default() };
        assert_eq!(s.backoff_for(1), Duration::from_millis(100));
        assert_eq!(s.backoff_for(2), Duration::from_millis(200));
        assert_eq!(s.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_increment_lookup() {
        let inc = PriorityIncrements::default();
        assert_eq!(inc.for_priority(Priority::Critical), 8);
        assert_eq!(inc.for_priority(Priority::Low), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
