//! Core domain models for the retention controller

use serde::Serialize;

/// Storage usage observed by a single capacity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSample {
    /// Bytes currently in use
    pub used_bytes: u64,
    /// Total disk bytes, or the configured capacity limit
    pub total_or_limit_bytes: u64,
}

impl UsageSample {
    /// Build a sample, rejecting a zero denominator
    pub fn new(used_bytes: u64, total_or_limit_bytes: u64) -> Option<Self> {
        (total_or_limit_bytes > 0).then_some(Self {
            used_bytes,
            total_or_limit_bytes,
        })
    }

    /// Fraction of the capacity in use. May exceed 1.0 against an absolute limit.
    pub fn ratio(&self) -> f64 {
        self.used_bytes as f64 / self.total_or_limit_bytes as f64
    }
}

/// What the retention policy decided for this invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionDecision {
    pub should_delete: bool,
    pub rows_to_delete: u64,
}

impl RetentionDecision {
    pub const KEEP: Self = Self {
        should_delete: false,
        rows_to_delete: 0,
    };
}

/// Rounds left to skip before capacity is checked again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CooldownState {
    pub rounds_remaining: u32,
}

impl CooldownState {
    pub fn new(rounds_remaining: u32) -> Self {
        Self { rounds_remaining }
    }

    /// Consume one round of the cooldown.
    ///
    /// Returns the state to persist when this round must be skipped, or
    /// `None` when the cooldown has run out and capacity should be checked.
    pub fn consume(self) -> Option<Self> {
        match self.rounds_remaining {
            0 => None,
            n => Some(Self::new(n - 1)),
        }
    }
}

/// Terminal outcome of one invocation that did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Cooldown active; no probe or deletion was performed
    Skipped { rounds_remaining: u32 },
    /// Usage is at or below the threshold
    BelowThreshold { ratio: f64 },
    /// Usage or row count could not be read; nothing more this round
    NoOp { reason: String },
    /// Over threshold, but the bulk delete was rejected or lost
    DeleteFailed {
        ratio: f64,
        rows_to_delete: u64,
        reason: String,
    },
    /// Over threshold, but the table holds nothing to delete
    NothingToDelete { ratio: f64 },
    /// The oldest rows were deleted
    Deleted { ratio: f64, rows_deleted: u64 },
}

impl Outcome {
    pub fn deleted(&self) -> bool {
        matches!(self, Outcome::Deleted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let sample = UsageSample::new(600 * 1024 * 1024, 1024 * 1024 * 1024).unwrap();
        assert!((sample.ratio() - 0.5859375).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_rejected() {
        assert!(UsageSample::new(10, 0).is_none());
    }

    #[test]
    fn test_cooldown_consume() {
        assert_eq!(CooldownState::new(3).consume(), Some(CooldownState::new(2)));
        assert_eq!(CooldownState::new(1).consume(), Some(CooldownState::new(0)));
        assert_eq!(CooldownState::new(0).consume(), None);
    }

    #[test]
    fn test_delete_failed_is_tagged_and_not_a_deletion() {
        let outcome = Outcome::DeleteFailed {
            ratio: 0.75,
            rows_to_delete: 500,
            reason: "Transport error: connection reset".to_string(),
        };
        assert!(!outcome.deleted());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "delete_failed");
        assert_eq!(json["rows_to_delete"], 500);
    }
}
