//! Durations in the collector / router notation (`30s`, `1m30s`, `4h`)

use promshard_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tracing::warn;

const UNITS: [(u128, &str); 7] = [
    (365 * 24 * 60 * 60 * 1000, "y"),
    (7 * 24 * 60 * 60 * 1000, "w"),
    (24 * 60 * 60 * 1000, "d"),
    (60 * 60 * 1000, "h"),
    (60 * 1000, "m"),
    (1000, "s"),
    (1, "ms"),
];

/// A duration that serializes the way the collector and router expect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromDuration(Duration);

impl PromDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse `5m`, `1h30m`, `1d` and the other forms humantime accepts
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("empty duration"));
        }
        humantime::parse_duration(trimmed)
            .map(Self)
            .map_err(|e| Error::validation(format!("invalid duration '{}': {}", value, e)))
    }

    /// Parse `value`, substituting `fallback` with a warning when it is malformed
    pub fn parse_or(value: &str, fallback: Duration, field: &str) -> Self {
        match Self::parse(value) {
            Ok(duration) => duration,
            Err(e) => {
                warn!(field = %field, value = %value, fallback = ?fallback, error = %e, "Falling back to default duration");
                Self(fallback)
            }
        }
    }
}

impl From<Duration> for PromDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut millis = self.0.as_millis();
        if millis == 0 {
            return f.write_str("0s");
        }
        for (unit, suffix) in UNITS {
            if millis >= unit {
                write!(f, "{}{}", millis / unit, suffix)?;
                millis %= unit;
            }
        }
        Ok(())
    }
}

impl Serialize for PromDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
