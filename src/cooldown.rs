//! Cooldown tracker - skips rounds after a deletion while compaction catches up
//!
//! Bulk deletes do not free disk space until the storage engine's background
//! merges run. Without a cooldown the next few invocations would still see
//! usage over the threshold and delete again.

use crate::error::{MarkerError, SinkError};
use crate::models::CooldownState;
use crate::sink::StateSink;
use tracing::{debug, error, info, warn};

/// Text that introduces a cooldown marker in the state stream
pub const MARKER_PREFIX: &str = "Number of rounds to be skipped: ";

/// Render the marker line for a state
pub fn marker_line(state: CooldownState) -> String {
    format!("{}{}", MARKER_PREFIX, state.rounds_remaining)
}

/// Find the last well-formed marker in `content`.
///
/// Scans lines from the end; unrelated lines and markers with an unparsable
/// count are passed over. The prefix may appear anywhere in a line, so markers
/// written through a log formatter are recognised too.
pub fn latest_marker(content: &str) -> Result<CooldownState, MarkerError> {
    let mut last_malformed = None;

    for line in content.lines().rev() {
        let Some(idx) = line.rfind(MARKER_PREFIX) else {
            continue;
        };
        let value = line[idx + MARKER_PREFIX.len()..]
            .split_whitespace()
            .next()
            .unwrap_or("");
        match value.parse::<u32>() {
            Ok(n) => return Ok(CooldownState::new(n)),
            Err(_) => {
                debug!(line, "Ignoring malformed cooldown marker");
                last_malformed.get_or_insert_with(|| line.to_string());
            }
        }
    }

    Err(match last_malformed {
        Some(line) => MarkerError::Malformed(line),
        None => MarkerError::Missing,
    })
}

/// Persists the rounds-to-skip counter through a [`StateSink`]
pub struct CooldownTracker<S> {
    sink: S,
    skip_rounds: u32,
}

impl<S: StateSink> CooldownTracker<S> {
    pub fn new(sink: S, skip_rounds: u32) -> Self {
        Self { sink, skip_rounds }
    }

    /// Recover the last persisted state. Anything unreadable means "check now".
    pub async fn current(&self) -> CooldownState {
        let content = match self.sink.read_all().await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Failed to read cooldown state, checking capacity now");
                return CooldownState::default();
            }
        };

        match latest_marker(&content) {
            Ok(state) => state,
            Err(MarkerError::Missing) => {
                debug!("No cooldown marker found, checking capacity now");
                CooldownState::default()
            }
            Err(e) => {
                warn!(error = %e, "Unusable cooldown marker, checking capacity now");
                CooldownState::default()
            }
        }
    }

    /// Whether this round should be skipped.
    ///
    /// Consumes one round of an active cooldown and persists what is left.
    /// Returns the persisted state when skipping. A decrement that cannot be
    /// persisted does not skip, otherwise the same count would be read back
    /// on every later run.
    pub async fn should_skip(&self) -> Option<CooldownState> {
        let next = self.current().await.consume()?;
        if let Err(e) = self.persist(next).await {
            warn!(error = %e, "Cannot persist cooldown countdown, checking capacity now");
            return None;
        }
        info!(rounds_remaining = next.rounds_remaining, "Cooldown active, skipping this round");
        Some(next)
    }

    /// Record the end of a round that reached the store.
    ///
    /// A deletion restarts the cooldown at `skip_rounds`; anything else clears it.
    pub async fn record_outcome(&self, deleted: bool) -> CooldownState {
        let state = if deleted {
            CooldownState::new(self.skip_rounds)
        } else {
            CooldownState::default()
        };
        if let Err(e) = self.persist(state).await {
            error!(
                error = %e,
                rounds_remaining = state.rounds_remaining,
                "Failed to persist cooldown state"
            );
        }
        state
    }

    async fn persist(&self, state: CooldownState) -> Result<(), SinkError> {
        let line = marker_line(state);
        self.sink.append(&line).await?;
        info!(rounds_remaining = state.rounds_remaining, "{}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryStateSink;
    use std::io;

    /// Readable, but every write fails as on a full disk
    struct FullDiskSink(&'static str);

    impl StateSink for FullDiskSink {
        async fn read_all(&self) -> Result<String, SinkError> {
            Ok(self.0.to_string())
        }

        async fn append(&self, _line: &str) -> Result<(), SinkError> {
            Err(io::Error::new(io::ErrorKind::Other, "No space left on device").into())
        }
    }

    #[test]
    fn test_latest_marker_ignores_trailing_output() {
        let log = "\
I1019 10:00:00 monitor.go:52] Memory usage: total 1000, used: 600, percentage: 0.600000
I1019 10:00:01 monitor.go:57] Number of rounds to be skipped: 3
I1019 10:05:00 monitor.go:80] Number of rounds to be skipped: 2
connection pool closed
some other component: done
";
        assert_eq!(latest_marker(log), Ok(CooldownState::new(2)));
    }

    #[test]
    fn test_latest_marker_skips_malformed_markers() {
        let log = "Number of rounds to be skipped: 1\nNumber of rounds to be skipped: lots\n";
        assert_eq!(latest_marker(log), Ok(CooldownState::new(1)));

        let log = "Number of rounds to be skipped: -1\n";
        assert!(matches!(latest_marker(log), Err(MarkerError::Malformed(_))));
    }

    #[test]
    fn test_latest_marker_missing() {
        assert_eq!(latest_marker(""), Err(MarkerError::Missing));
        assert_eq!(latest_marker("hello\nworld\n"), Err(MarkerError::Missing));
    }

    #[test]
    fn test_latest_marker_with_timestamp_and_trailing_fields() {
        let log = "2026-10-19T10:00:00Z Number of rounds to be skipped: 4 rounds_remaining=4\n";
        assert_eq!(latest_marker(log), Ok(CooldownState::new(4)));
    }

    #[tokio::test]
    async fn test_skip_sequence_after_deletion() {
        let tracker = CooldownTracker::new(MemoryStateSink::new(), 3);

        assert_eq!(tracker.should_skip().await, None);
        tracker.record_outcome(true).await;

        assert_eq!(tracker.should_skip().await, Some(CooldownState::new(2)));
        assert_eq!(tracker.should_skip().await, Some(CooldownState::new(1)));
        assert_eq!(tracker.should_skip().await, Some(CooldownState::new(0)));
        assert_eq!(tracker.should_skip().await, None);
    }

    #[tokio::test]
    async fn test_no_deletion_clears_cooldown() {
        let sink = MemoryStateSink::with_content("Number of rounds to be skipped: 5\n");
        let tracker = CooldownTracker::new(sink.clone(), 3);

        tracker.record_outcome(false).await;

        assert_eq!(tracker.current().await, CooldownState::new(0));
        assert!(sink.contents().ends_with("Number of rounds to be skipped: 0\n"));
    }

    #[tokio::test]
    async fn test_garbage_sink_means_check_now() {
        let sink = MemoryStateSink::with_content("Number of rounds to be skipped: ???\n");
        let tracker = CooldownTracker::new(sink.clone(), 3);

        assert_eq!(tracker.should_skip().await, None);
        // Nothing is written when not skipping
        assert_eq!(sink.contents(), "Number of rounds to be skipped: ???\n");
    }

    #[tokio::test]
    async fn test_unwritable_sink_does_not_skip() {
        let tracker = CooldownTracker::new(FullDiskSink("Number of rounds to be skipped: 3\n"), 3);

        for _ in 0..5 {
            assert_eq!(tracker.should_skip().await, None);
        }
        // Outcome recording on an unwritable sink is logged, not fatal
        assert_eq!(tracker.record_outcome(true).await, CooldownState::new(3));
    }
}
