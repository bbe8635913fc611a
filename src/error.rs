//! Error taxonomy for fleetsync.
//!
//! The important split is between `Transient` (retried internally with
//! backoff), `Unavailable` (retries exhausted, surfaced to the caller) and
//! `Conflict` (never retried). `NotFound` is a valid outcome for reads and is
//! therefore expressed as `Ok(None)` on the read path; the variant exists for
//! operations where absence is a genuine failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Key absent where a record was required.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The store rejected a write due to a constraint. Not retried.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// Timeout or connection blip. Retried internally up to the retry
    /// ceiling, then surfaced as `Unavailable`.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Store or bus unreachable after retries were exhausted.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Malformed payload on the bus or in storage. The offending event or
    /// record is logged and dropped, never applied.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Coordinator has shut down or was never started.
    #[error("not running: {0}")]
    NotRunning(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Should the operation be retried with backoff?
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Error::NotFound(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Error::Unavailable(e.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                Error::Transient(e.to_string())
            }
            sqlx::Error::Database(db) => {
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                {
                    Error::Conflict(db.to_string())
                } else {
                    Error::Transient(db.to_string())
                }
            }
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
                Error::Serialization(e.to_string())
            }
            _ => Error::Internal(e.to_string()),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() {
            Error::Transient(e.to_string())
        } else if e.is_connection_refusal() {
            Error::Unavailable(e.to_string())
        } else {
            Error::Internal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_the_only_retryable_class() {
        assert!(Error::Transient("timeout".into()).is_transient());
        assert!(!Error::Unavailable("pool exhausted".into()).is_transient());
        assert!(!Error::Conflict("duplicate key".into()).is_transient());
        assert!(!Error::NotFound("player:42".into()).is_transient());
    }

    #[test]
    fn json_errors_map_to_serialization() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(Error::from(bad), Error::Serialization(_)));
    }
}
