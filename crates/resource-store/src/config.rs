//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between reaper passes.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a [`ResourceStore`](crate::ResourceStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Interval between reaper passes.
    ///
    /// The reaper marks a populated entry stale on its first visit and
    /// removes it on the second, so an unclaimed resource stays in the
    /// store between `reap_interval` and `2 * reap_interval`.
    #[serde(default = "default_reap_interval")]
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,
}

const fn default_reap_interval() -> Duration {
    DEFAULT_REAP_INTERVAL
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reap_interval: default_reap_interval(),
        }
    }
}

impl StoreConfig {
    /// Creates a config with a custom reap interval.
    ///
    /// Short intervals are intended for tests; most embedders should keep
    /// the default.
    #[must_use]
    pub const fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reap_interval() {
        let config = StoreConfig::default();
        assert_eq!(config.reap_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_with_reap_interval() {
        let config = StoreConfig::default().with_reap_interval(Duration::from_millis(50));
        assert_eq!(config.reap_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = StoreConfig::default().with_reap_interval(Duration::from_secs(90));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("1m 30s"));

        let parsed: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_deserialize_defaults_missing_field() {
        let parsed: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.reap_interval, DEFAULT_REAP_INTERVAL);
    }

    #[test]
    fn test_deserialize_humantime_string() {
        let parsed: StoreConfig = serde_json::from_str(r#"{"reap_interval": "250ms"}"#).unwrap();
        assert_eq!(parsed.reap_interval, Duration::from_millis(250));
    }
}
