//! Store access layer: the connection traits and per-backend SQL

pub mod clickhouse;
pub mod postgres;

use crate::config::TableRef;
use crate::error::StoreError;
use std::future::Future;

pub use clickhouse::{ClickHouseConnector, ClickHouseStore};
pub use postgres::{PostgresConnector, PostgresStore};

/// One numeric result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(pub Vec<u64>);

impl Row {
    pub fn get(&self, idx: usize) -> Result<u64, StoreError> {
        self.0.get(idx).copied().ok_or_else(|| {
            StoreError::malformed(format!("expected column {} in row of {}", idx, self.0.len()))
        })
    }
}

/// A live, health-checked connection to the store
pub trait Store: Send + Sync {
    /// SQL flavor this store speaks
    fn dialect(&self) -> Dialect;

    /// Run a query whose columns are all non-negative integers
    fn query(&self, sql: &str) -> impl Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Run a statement, returning the affected row count the store reports
    fn exec(&self, sql: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Opens connections to a store
pub trait Connector: Send + Sync {
    type Store: Store;

    /// Open a connection and health-check it
    fn connect(&self) -> impl Future<Output = Result<Self::Store, StoreError>> + Send;
}

/// SQL flavors for the statements the controller issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    ClickHouse,
    Postgres,
}

impl Dialect {
    /// `(free_bytes, total_bytes)`; `None` when the store has no disk accounting view
    pub fn disk_usage_sql(&self) -> Option<String> {
        match self {
            Dialect::ClickHouse => Some("SELECT free_space, total_space FROM system.disks".to_string()),
            Dialect::Postgres => None,
        }
    }

    /// `(used_bytes)` of the target table
    pub fn table_bytes_sql(&self, table: &TableRef) -> String {
        match self {
            Dialect::ClickHouse => format!(
                "SELECT total_bytes FROM system.tables WHERE database='{}' AND name='{}'",
                table.database, table.table
            ),
            Dialect::Postgres => format!(
                "SELECT pg_total_relation_size('{}')::bigint",
                table.qualified()
            ),
        }
    }

    /// `(count)` of the target table
    pub fn row_count_sql(&self, table: &TableRef) -> String {
        match self {
            Dialect::ClickHouse => format!("SELECT count() FROM {}", table.qualified()),
            Dialect::Postgres => format!("SELECT count(*)::bigint FROM {}", table.qualified()),
        }
    }

    /// Bulk delete of the `n` oldest rows, by creation order then id
    pub fn delete_oldest_sql(&self, table: &TableRef, n: u64) -> String {
        let order = match &table.order_column {
            Some(col) => format!("{}, {}", col, table.id_column),
            None => table.id_column.clone(),
        };
        let oldest = format!(
            "SELECT {id} FROM {t} ORDER BY {order} LIMIT {n}",
            id = table.id_column,
            t = table.qualified(),
        );
        match self {
            Dialect::ClickHouse => format!(
                "ALTER TABLE {} DELETE WHERE {} IN ({})",
                table.qualified(),
                table.id_column,
                oldest
            ),
            Dialect::Postgres => format!(
                "DELETE FROM {} WHERE {} IN ({})",
                table.qualified(),
                table.id_column,
                oldest
            ),
        }
    }
}

/// Take the single row a capacity or count query must return
pub fn single_row(rows: Vec<Row>) -> Result<Row, StoreError> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (Some(row), None) => Ok(row),
        _ => Err(StoreError::malformed(format!("expected exactly one row, got {}", count))),
    }
}
