//! Retention policy - decides when to delete and how much

use crate::config::TableRef;
use crate::error::StoreError;
use crate::models::{RetentionDecision, UsageSample};
use crate::store::{single_row, Store};
use std::future::Future;
use tracing::{debug, info};

/// Threshold and delete fraction applied to each usage sample
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Usage ratio above which deletion triggers
    pub threshold: f64,
    /// Fraction of current rows removed per deletion
    pub delete_percentage: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            delete_percentage: 0.5,
        }
    }
}

impl RetentionPolicy {
    pub fn new(threshold: f64, delete_percentage: f64) -> Self {
        Self {
            threshold,
            delete_percentage,
        }
    }

    /// Strictly above the threshold; a ratio equal to it keeps everything
    pub fn exceeds(&self, usage: &UsageSample) -> bool {
        usage.ratio() > self.threshold
    }

    /// `floor(row_count * delete_percentage)`, never more than `row_count`
    pub fn rows_to_delete(&self, row_count: u64) -> u64 {
        let rows = (row_count as f64 * self.delete_percentage).floor() as u64;
        rows.min(row_count)
    }

    /// Decide for one sample. `row_counter` only runs when over the threshold.
    pub async fn decide<F, Fut>(
        &self,
        usage: &UsageSample,
        row_counter: F,
    ) -> Result<RetentionDecision, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, StoreError>>,
    {
        if !self.exceeds(usage) {
            debug!(ratio = usage.ratio(), threshold = self.threshold, "Usage below threshold");
            return Ok(RetentionDecision::KEEP);
        }

        let row_count = row_counter().await?;
        let decision = RetentionDecision {
            should_delete: true,
            rows_to_delete: self.rows_to_delete(row_count),
        };

        info!(
            ratio = usage.ratio(),
            threshold = self.threshold,
            row_count,
            rows_to_delete = decision.rows_to_delete,
            "Usage above threshold"
        );
        Ok(decision)
    }
}

/// Current number of rows in the target table
pub async fn count_rows<S: Store>(store: &S, table: &TableRef) -> Result<u64, StoreError> {
    let sql = store.dialect().row_count_sql(table);
    single_row(store.query(&sql).await?)?.get(0)
}

/// Bulk-delete the `n` oldest rows in a single statement
pub async fn delete_oldest<S: Store>(store: &S, table: &TableRef, n: u64) -> Result<u64, StoreError> {
    let sql = store.dialect().delete_oldest_sql(table, n);
    store.exec(&sql).await
}
