use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{error, info, instrument, warn};

use super::{FlagDefinition, FlagStore, RolloutPercentage};
use crate::connection::{ConnectionManager, PgConnector};
use crate::error::StoreError;

// Database row type. Columns are optional so a NULL written by some other
// tool shows up as a corrupt record instead of a decode failure.
#[derive(Debug, sqlx::FromRow)]
struct FlagRow {
    key: String,
    enabled: Option<bool>,
    environments: Option<Vec<String>>,
    target_users: Option<Vec<String>>,
    rollout_percentage: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlagRow> for FlagDefinition {
    type Error = StoreError;

    fn try_from(row: FlagRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRecord {
            key: row.key.clone(),
            reason,
        };

        let enabled = row.enabled.ok_or_else(|| corrupt("enabled is null".to_string()))?;
        let environments = row
            .environments
            .ok_or_else(|| corrupt("environments is null".to_string()))?;
        let target_users = row
            .target_users
            .ok_or_else(|| corrupt("target_users is null".to_string()))?;
        let percentage = row
            .rollout_percentage
            .ok_or_else(|| corrupt("rollout_percentage is null".to_string()))?;
        let rollout_percentage =
            RolloutPercentage::new(i64::from(percentage)).map_err(|e| corrupt(e.to_string()))?;

        Ok(FlagDefinition {
            key: row.key,
            enabled,
            environments: environments.into_iter().collect(),
            target_users: target_users.into_iter().collect(),
            rollout_percentage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Flag store backed by the `feature_flags` table.
pub struct PgFlagStore {
    connections: Arc<ConnectionManager<PgConnector>>,
}

impl PgFlagStore {
    pub fn new(connections: Arc<ConnectionManager<PgConnector>>) -> Self {
        Self { connections }
    }

    /// Brings the schema up to the version embedded in this binary.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let pool = self.connections.acquire().await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;
        info!("flag store schema is up to date");
        Ok(())
    }

    async fn pool(&self) -> Result<PgPool, StoreError> {
        Ok(self.connections.acquire().await?)
    }
}

// Rows come back untyped and are decoded one at a time, so a single bad row
// never fails the whole query.
fn query_error(key: Option<&str>, e: sqlx::Error) -> StoreError {
    error!(error = %e, flag_key = key, "flag store query failed");
    StoreError::Unavailable(e)
}

fn decode_error(key: &str, e: sqlx::Error) -> StoreError {
    StoreError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

fn decode(row: &PgRow) -> Result<FlagDefinition, StoreError> {
    let key: String = row.try_get("key").unwrap_or_default();
    let row = FlagRow::from_row(row).map_err(|e| decode_error(&key, e))?;
    FlagDefinition::try_from(row)
}

fn readable(
    rows: impl IntoIterator<Item = Result<FlagDefinition, StoreError>>,
) -> Vec<FlagDefinition> {
    rows.into_iter()
        .filter_map(|row| match row {
            Ok(flag) => Some(flag),
            Err(e) => {
                warn!(error = %e, "skipping unreadable flag record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl FlagStore for PgFlagStore {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<Option<FlagDefinition>, StoreError> {
        let pool = self.pool().await?;

        let row = sqlx::query(
            r#"
            SELECT key, enabled, environments, target_users, rollout_percentage,
                   created_at, updated_at
            FROM feature_flags
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&pool)
        .await
        .map_err(|e| query_error(Some(key), e))?;

        row.as_ref().map(decode).transpose()
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<FlagDefinition>, StoreError> {
        let pool = self.pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT key, enabled, environments, target_users, rollout_percentage,
                   created_at, updated_at
            FROM feature_flags
            ORDER BY key
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| query_error(None, e))?;

        Ok(readable(rows.iter().map(decode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> FlagRow {
        FlagRow {
            key: "new-checkout".to_string(),
            enabled: Some(true),
            environments: Some(vec!["production".to_string(), "staging".to_string()]),
            target_users: Some(vec!["u1".to_string()]),
            rollout_percentage: Some(25),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_converts_to_definition() {
        let flag = FlagDefinition::try_from(row()).unwrap();
        assert_eq!(flag.key, "new-checkout");
        assert!(flag.enabled);
        assert!(flag.environments.contains("staging"));
        assert!(flag.target_users.contains("u1"));
        assert_eq!(flag.rollout_percentage.value(), 25);
    }

    #[test]
    fn test_out_of_range_percentage_is_corrupt() {
        let mut row = row();
        row.rollout_percentage = Some(140);

        let err = FlagDefinition::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "new-checkout"));
    }

    #[test]
    fn test_null_column_is_corrupt() {
        let mut row = row();
        row.environments = None;

        let err = FlagDefinition::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
    }

    #[test]
    fn test_decode_failure_is_corrupt_for_its_key() {
        let cause = sqlx::Error::ColumnDecode {
            index: "\"environments\"".to_string(),
            source: "mismatched types; Rust type `Vec<String>` is not compatible".into(),
        };

        let err = decode_error("new-checkout", cause);
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "new-checkout"));
    }

    #[test]
    fn test_listing_skips_unreadable_rows() {
        let mut bad = row();
        bad.key = "broken".to_string();
        bad.enabled = None;
        let undecodable = decode_error(
            "also-broken",
            sqlx::Error::Decode("unexpected null".into()),
        );

        let flags = readable([
            FlagDefinition::try_from(row()),
            FlagDefinition::try_from(bad),
            Err(undecodable),
        ]);

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].key, "new-checkout");
    }
}
