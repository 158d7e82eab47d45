//! State sinks - append-only text streams that carry state across invocations

use crate::error::SinkError;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default size at which a state file is compacted
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024;

/// An append-only stream that may also hold unrelated output
pub trait StateSink: Send + Sync {
    /// Everything written so far; empty when nothing has been written yet
    fn read_all(&self) -> impl Future<Output = Result<String, SinkError>> + Send;

    /// Append one line
    fn append(&self, line: &str) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Appends timestamped lines to a file.
///
/// Every line is a complete record, so once the file grows past `max_bytes`
/// it is rewritten to hold only the line just appended. The rewrite goes
/// through a sibling temp file and a rename, so readers see either the old
/// file or the compacted one.
#[derive(Debug, Clone)]
pub struct FileStateSink {
    path: PathBuf,
    max_bytes: u64,
}

impl FileStateSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn compact(&self, latest: &str) -> Result<(), SinkError> {
        let temp = self.temp_path();
        tokio::fs::write(&temp, latest).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

impl StateSink for FileStateSink {
    async fn read_all(&self) -> Result<String, SinkError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, line: &str) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let stamped = format!(
            "{} {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            line
        );
        file.write_all(stamped.as_bytes()).await?;
        file.flush().await?;
        let len = file.metadata().await?.len();
        drop(file);

        if len > self.max_bytes {
            // The line is already durable; a failed compaction only leaves the file long
            match self.compact(&stamped).await {
                Ok(()) => debug!(path = %self.path.display(), previous_bytes = len, "Compacted state file"),
                Err(e) => warn!(error = %e, path = %self.path.display(), "Failed to compact state file"),
            }
        }
        Ok(())
    }
}

/// In-memory sink, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStateSink {
    buffer: Arc<Mutex<String>>,
}

impl MemoryStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing content
    pub fn with_content(content: &str) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(content.to_string())),
        }
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }
}

impl StateSink for MemoryStateSink {
    async fn read_all(&self) -> Result<String, SinkError> {
        Ok(self.contents())
    }

    async fn append(&self, line: &str) -> Result<(), SinkError> {
        let mut buffer = self.buffer.lock();
        buffer.push_str(line);
        buffer.push('\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileStateSink::new(dir.path().join("nested").join("state.log"));
        assert_eq!(sink.read_all().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_file_sink_appends_stamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileStateSink::new(dir.path().join("nested").join("state.log"));

        sink.append("first").await.unwrap();
        sink.append("second").await.unwrap();

        let content = sink.read_all().await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
        assert!(lines[0].contains('T'));
    }

    #[tokio::test]
    async fn test_file_sink_stays_bounded() {
        use crate::cooldown::{latest_marker, marker_line};
        use crate::models::CooldownState;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.log");
        let sink = FileStateSink::new(&path).with_max_bytes(256);

        for n in (0..500u32).rev() {
            sink.append(&marker_line(CooldownState::new(n % 7))).await.unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() <= 256);
        }

        let content = sink.read_all().await.unwrap();
        assert_eq!(latest_marker(&content), Ok(CooldownState::new(0)));
        assert!(!dir.path().join("state.log.tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_sink_shared_between_clones() {
        let sink = MemoryStateSink::with_content("boot\n");
        let clone = sink.clone();
        clone.append("hello").await.unwrap();
        assert_eq!(sink.read_all().await.unwrap(), "boot\nhello\n");
    }
}
