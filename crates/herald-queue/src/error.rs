//! Broker error types.

use herald_core::HeraldError;
use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors reported by a [`Broker`](crate::Broker).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The stream does not exist.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// The consumer group does not exist on the stream.
    #[error("no such consumer group '{group}' for key '{key}'")]
    NoSuchGroup {
        /// Stream key.
        key: String,
        /// Group name.
        group: String,
    },

    /// The consumer group already exists on the stream.
    #[error("consumer group '{group}' already exists for key '{key}'")]
    GroupExists {
        /// Stream key.
        key: String,
        /// Group name.
        group: String,
    },

    /// A stream id could not be parsed.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    /// The broker handle was closed.
    #[error("broker closed")]
    Closed,
}

impl BrokerError {
    /// Returns `true` for transient failures.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<BrokerError> for HeraldError {
    fn from(err: BrokerError) -> Self {
        Self::broker_with_source(err.to_string(), err)
    }
}
