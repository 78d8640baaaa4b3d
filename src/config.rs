//! Configuration for the polling scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing configuration for a [`Poller`](crate::scheduler::Poller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Fixed sleep between scheduler ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Length of one wait unit as counted against a request's interval, in milliseconds.
    pub time_unit_ms: u64,
    /// Slack added to a measured delta before truncating to whole units.
    ///
    /// A tick that wakes a few milliseconds early would otherwise report zero
    /// elapsed units and drift a whole interval late.
    pub rounding_slack_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            time_unit_ms: 1_000,
            rounding_slack_ms: 100,
        }
    }
}

impl PollerConfig {
    /// Parse configuration from a TOML string, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Config`](crate::PollError::Config) if the string is not
    /// valid TOML or the resulting values fail [`validate`](Self::validate).
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| crate::PollError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(crate::PollError::Config(
                "tick_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.time_unit_ms == 0 {
            return Err(crate::PollError::Config(
                "time_unit_ms must be greater than zero".to_owned(),
            ));
        }
        if self.rounding_slack_ms >= self.time_unit_ms {
            return Err(crate::PollError::Config(
                "rounding_slack_ms must be smaller than time_unit_ms".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }

    pub fn rounding_slack(&self) -> Duration {
        Duration::from_millis(self.rounding_slack_ms)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_tick_once_per_second() {
        let config = PollerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.time_unit(), Duration::from_secs(1));
        assert_eq!(config.rounding_slack(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = PollerConfig::from_toml_str("tick_interval_ms = 250").unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.time_unit_ms, 1_000);
        assert_eq!(config.rounding_slack_ms, 100);
    }

    #[test]
    fn empty_document_is_default() {
        let config = PollerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PollerConfig::default());
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let err = PollerConfig::from_toml_str("tick_interval_ms = 0").unwrap_err();
        assert!(matches!(err, crate::PollError::Config(_)));
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn zero_time_unit_is_rejected() {
        let config = PollerConfig {
            time_unit_ms: 0,
            ..PollerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::PollError::Config(_))
        ));
    }

    #[test]
    fn slack_of_a_whole_unit_is_rejected() {
        let err =
            PollerConfig::from_toml_str("time_unit_ms = 500\nrounding_slack_ms = 500").unwrap_err();
        assert!(err.to_string().contains("rounding_slack_ms"));
        assert!(PollerConfig::from_toml_str("time_unit_ms = 500\nrounding_slack_ms = 499").is_ok());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = PollerConfig::from_toml_str("tick_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, crate::PollError::Config(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pollr.toml");
        std::fs::write(&path, "time_unit_ms = 500\nrounding_slack_ms = 0\n").unwrap();

        let config = PollerConfig::from_file(&path).unwrap();
        assert_eq!(config.time_unit(), Duration::from_millis(500));
        assert_eq!(config.rounding_slack(), Duration::ZERO);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PollerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, crate::PollError::Io(_)));
    }
}
