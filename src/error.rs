//! Error types for salix.

use thiserror::Error;

/// Result type alias using [`SalixError`].
pub type Result<T> = std::result::Result<T, SalixError>;

/// Errors produced by the indexing and search core.
#[derive(Error, Debug)]
pub enum SalixError {
    /// The target shard has reached its configured document capacity.
    ///
    /// Recoverable: re-acquire a writer for the same key, which rolls the
    /// key over to a fresh shard.
    #[error("shard {shard_id} is full")]
    ShardFull {
        /// Id of the shard that refused the document.
        shard_id: u64,
    },

    /// A shard writer could not be opened or created on its volume.
    #[error("failed to open shard: {0}")]
    ShardOpen(String),

    /// An operation was attempted against a closed or deleted shard writer.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The search was cancelled cooperatively. An expected early-exit
    /// outcome, not a failure.
    #[error("search terminated")]
    SearchTerminated,

    /// Index data failed validation (bad magic, checksum mismatch, ...).
    #[error("corrupt index data: {0}")]
    Corrupt(String),

    /// General indexing failure.
    #[error("index error: {0}")]
    Index(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SalixError {
    /// Create a shard-open error.
    pub fn shard_open(msg: impl Into<String>) -> Self {
        SalixError::ShardOpen(msg.into())
    }

    /// Create an illegal-state error.
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        SalixError::IllegalState(msg.into())
    }

    /// Create a corruption error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SalixError::Corrupt(msg.into())
    }

    /// Create a general index error.
    pub fn index(msg: impl Into<String>) -> Self {
        SalixError::Index(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        SalixError::InvalidArgument(msg.into())
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SalixError::InvalidConfig(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        SalixError::NotFound(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        SalixError::Internal(msg.into())
    }

    /// True if this is the capacity signal that the ingest caller resolves
    /// by re-acquiring a writer.
    pub fn is_shard_full(&self) -> bool {
        matches!(self, SalixError::ShardFull { .. })
    }

    /// True if this is the cooperative cancellation signal.
    pub fn is_terminated(&self) -> bool {
        matches!(self, SalixError::SearchTerminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SalixError::ShardFull { shard_id: 3 }.is_shard_full());
        assert!(!SalixError::ShardFull { shard_id: 3 }.is_terminated());
        assert!(SalixError::SearchTerminated.is_terminated());
        assert!(!SalixError::index("x").is_shard_full());
    }

    #[test]
    fn test_display() {
        let e = SalixError::ShardFull { shard_id: 42 };
        assert_eq!(e.to_string(), "shard 42 is full");

        let e = SalixError::shard_open("no space on volume");
        assert_eq!(e.to_string(), "failed to open shard: no space on volume");
    }
}
