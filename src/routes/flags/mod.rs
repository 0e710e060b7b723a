pub mod routes;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::FlagDefinition;

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub key: String,
    pub enabled: bool,
    pub environments: Vec<String>,
    pub target_users: Vec<String>,
    pub rollout_percentage: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FlagDefinition> for FlagResponse {
    fn from(flag: FlagDefinition) -> Self {
        // Sets have no order; sort so listings are stable between requests.
        let mut environments: Vec<_> = flag.environments.into_iter().collect();
        environments.sort();
        let mut target_users: Vec<_> = flag.target_users.into_iter().collect();
        target_users.sort();

        Self {
            key: flag.key,
            enabled: flag.enabled,
            environments,
            target_users,
            rollout_percentage: flag.rollout_percentage.value(),
            created_at: flag.created_at,
            updated_at: flag.updated_at,
        }
    }
}
