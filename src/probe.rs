//! Capacity probe - measures how much of the available storage is in use

use crate::config::{ProbeKind, TableRef};
use crate::error::StoreError;
use crate::models::UsageSample;
use crate::store::{single_row, Store};
use tracing::info;

/// Strategy for sampling storage usage from a live store
#[derive(Debug, Clone)]
pub enum CapacityProbe {
    /// `used = total - free` from the engine's disk accounting view
    DiskRelative,
    /// Bytes accounted to the target table against an absolute limit
    TableRelative { table: TableRef, limit_bytes: u64 },
}

impl CapacityProbe {
    pub fn from_config(kind: ProbeKind, table: &TableRef) -> Self {
        match kind {
            ProbeKind::Disk => CapacityProbe::DiskRelative,
            ProbeKind::Table { limit_bytes } => CapacityProbe::TableRelative {
                table: table.clone(),
                limit_bytes,
            },
        }
    }

    /// Take one usage sample. The query must return exactly one row.
    pub async fn sample<S: Store>(&self, store: &S) -> Result<UsageSample, StoreError> {
        let sample = match self {
            CapacityProbe::DiskRelative => {
                let sql = store.dialect().disk_usage_sql().ok_or_else(|| {
                    StoreError::malformed("store has no disk accounting view")
                })?;
                let row = single_row(store.query(&sql).await?)?;
                let (free, total) = (row.get(0)?, row.get(1)?);
                if free > total {
                    return Err(StoreError::malformed(format!(
                        "free space {} exceeds total space {}",
                        free, total
                    )));
                }
                UsageSample::new(total - free, total)
            }
            CapacityProbe::TableRelative { table, limit_bytes } => {
                let sql = store.dialect().table_bytes_sql(table);
                let row = single_row(store.query(&sql).await?)?;
                UsageSample::new(row.get(0)?, *limit_bytes)
            }
        }
        .ok_or_else(|| StoreError::malformed("total capacity is zero"))?;

        info!(
            used_bytes = sample.used_bytes,
            total_bytes = sample.total_or_limit_bytes,
            ratio = sample.ratio(),
            "Storage usage"
        );
        Ok(sample)
    }
}
