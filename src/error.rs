//! Error types for the retention controller

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`Store`](crate::store::Store) operation.
///
/// Every variant is non-fatal to the process: an invocation that hits one
/// logs it and ends the round as a no-op.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Structured error reported by the store itself
    #[error("[{code}] {message}")]
    Server {
        code: String,
        message: String,
        trace: Option<String>,
    },

    /// The store could not be reached or the request never completed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered, but not with the expected row shape
    #[error("Malformed result: {0}")]
    MalformedResult(String),
}

impl StoreError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        StoreError::MalformedResult(msg.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let trace = db_err
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| {
                        let parts: Vec<&str> =
                            [pg.detail(), pg.hint(), pg.r#where()].into_iter().flatten().collect();
                        (!parts.is_empty()).then(|| parts.join("\n"))
                    });
                StoreError::Server {
                    code: db_err.code().map(|c| c.into_owned()).unwrap_or_default(),
                    message: db_err.message().to_string(),
                    trace,
                }
            }
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => StoreError::MalformedResult(err.to_string()),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::MalformedResult(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

/// Why a cooldown marker could not be recovered from the state sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("no cooldown marker found")]
    Missing,

    #[error("malformed cooldown marker: {0}")]
    Malformed(String),
}

/// State sink I/O failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("State sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or unusable configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{probe} capacity probe is not supported by the {backend} backend")]
    UnsupportedProbe {
        probe: &'static str,
        backend: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level errors that end an invocation with a failure exit code
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to connect to the store after {elapsed:?}")]
    ConnectionTimeout { elapsed: Duration },

    #[error("Failed to set up store client: {0}")]
    Setup(StoreError),
}

/// Result type alias using the top-level [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
