use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::Connector;
use crate::error::ConnectionError;

/// Opens `sqlx` Postgres pools for the flag store.
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    pub fn new(
        database_url: impl Into<String>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            acquire_timeout,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgPool;

    fn resource(&self) -> &'static str {
        "flag store"
    }

    async fn connect(&self) -> Result<PgPool, ConnectionError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }

    async fn disconnect(&self, pool: PgPool) {
        pool.close().await;
    }
}
