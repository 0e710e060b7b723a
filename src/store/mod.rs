pub mod memory;
pub mod postgres;

pub use memory::MemoryFlagStore;
pub use postgres::PgFlagStore;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// MODELS

/// A stored flag. Every read hands out an independent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub key: String,
    pub enabled: bool,
    #[serde(default)]
    pub environments: HashSet<String>,
    #[serde(default)]
    pub target_users: HashSet<String>,
    #[serde(default)]
    pub rollout_percentage: RolloutPercentage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlagDefinition {
    /// A disabled flag with no environments, no targets and 0% rollout.
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            enabled: false,
            environments: HashSet::new(),
            target_users: HashSet::new(),
            rollout_percentage: RolloutPercentage::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rollout(mut self, percentage: RolloutPercentage) -> Self {
        self.rollout_percentage = percentage;
        self
    }
}

/// An integer percentage in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RolloutPercentage(u8);

impl RolloutPercentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(100);

    pub fn new(value: i64) -> Result<Self, InvalidPercentage> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(InvalidPercentage(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RolloutPercentage {
    type Error = InvalidPercentage;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RolloutPercentage> for u8 {
    fn from(percentage: RolloutPercentage) -> Self {
        percentage.0
    }
}

impl fmt::Display for RolloutPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("rollout percentage must be between 0 and 100, got {0}")]
pub struct InvalidPercentage(pub i64);

// ACCESSOR

/// Read access to flag definitions keyed by flag key.
///
/// Implementations must tolerate concurrent reads while another actor writes
/// the same or a different key; the last write wins.
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// `Ok(None)` when no flag has this key.
    async fn fetch(&self, key: &str) -> Result<Option<FlagDefinition>, StoreError>;

    /// All readable definitions. Malformed records are skipped with a warning.
    async fn fetch_all(&self) -> Result<Vec<FlagDefinition>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(RolloutPercentage::new(0).unwrap(), RolloutPercentage::ZERO);
        assert_eq!(RolloutPercentage::new(100).unwrap(), RolloutPercentage::FULL);
        assert_eq!(RolloutPercentage::new(101), Err(InvalidPercentage(101)));
        assert_eq!(RolloutPercentage::new(-1), Err(InvalidPercentage(-1)));
    }

    #[test]
    fn test_definition_rejects_out_of_range_percentage() {
        let json = serde_json::json!({
            "key": "beta",
            "enabled": true,
            "environments": ["production"],
            "rollout_percentage": 150,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<FlagDefinition>(json).is_err());
    }

    #[test]
    fn test_definition_defaults_optional_fields() {
        let json = serde_json::json!({
            "key": "beta",
            "enabled": false,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z",
        });
        let flag: FlagDefinition = serde_json::from_value(json).unwrap();
        assert!(flag.environments.is_empty());
        assert!(flag.target_users.is_empty());
        assert_eq!(flag.rollout_percentage, RolloutPercentage::ZERO);
    }
}
