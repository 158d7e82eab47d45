//! PostgreSQL / TimescaleDB store via SQLx

use super::{Connector, Dialect, Row, Store};
use crate::config::StoreConfig;
use crate::error::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row as _;
use std::time::Duration;

/// Opens [`PostgresStore`] pools
#[derive(Clone)]
pub struct PostgresConnector {
    url: String,
    acquire_timeout: Duration,
}

impl PostgresConnector {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            url: config.url.clone(),
            acquire_timeout: config.request_timeout,
        }
    }
}

impl Connector for PostgresConnector {
    type Store = PostgresStore;

    async fn connect(&self) -> Result<PostgresStore, StoreError> {
        // One short-lived invocation issues statements sequentially
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(PostgresStore { pool })
    }
}

/// A health-checked PostgreSQL connection pool
pub struct PostgresStore {
    pool: PgPool,
}

impl Store for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| {
                        let value: i64 = row.try_get(idx)?;
                        u64::try_from(value).map_err(|_| {
                            StoreError::malformed(format!("negative value {} in column {}", value, idx))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row)
            })
            .collect()
    }

    async fn exec(&self, sql: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
