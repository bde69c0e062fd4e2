//! Progress engine configuration.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for quiz scoring, live updates and retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum module quiz score (0-100) that completes a module.
    #[serde(default = "default_passing_score")]
    pub module_passing_score: u8,
    /// Window used to coalesce bursts of progress changes.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Recompute interval when the store cannot push changes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Retries on transient store errors.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Module quiz threshold used when nothing is configured.
pub const DEFAULT_PASSING_SCORE: u8 = 80;

fn default_passing_score() -> u8 {
    DEFAULT_PASSING_SCORE
}
fn default_debounce_ms() -> u64 {
    250
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    200
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            module_passing_score: default_passing_score(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ProgressConfig {
    /// Parse from TOML; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Debounce window, clamped to 100-500ms.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.clamp(100, 500))
    }

    /// Poll interval, at least 100ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    /// Delay between retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Passing threshold, capped at 100.
    pub fn passing_score(&self) -> u8 {
        self.module_passing_score.min(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ProgressConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProgressConfig::default());
        assert_eq!(config.passing_score(), 80);
    }

    #[test]
    fn test_partial_toml_and_clamping() {
        let config = ProgressConfig::from_toml_str("debounce_ms = 5\nmodule_passing_score = 150\n").unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.passing_score(), 100);
        assert_eq!(config.retry_attempts, 2);

        let slow = ProgressConfig { debounce_ms: 2_000, ..Default::default() };
        assert_eq!(slow.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        assert!(ProgressConfig::from_toml_str("debounce_ms = \"fast\"").is_err());
    }
}
