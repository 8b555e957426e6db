//! Error types for the consumer runners.

use herald_core::HeraldError;
use herald_queue::BrokerError;
use thiserror::Error;
use tokio::task::JoinError;

/// Result type for runner operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that end a runner loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A broker round-trip failed.
    #[error("broker failure: {0}")]
    Broker(#[from] BrokerError),

    /// Registration, publishing or dispatch failed.
    #[error("dispatch failure: {0}")]
    Dispatch(#[from] HeraldError),

    /// The runner set kept failing after the allowed restarts.
    #[error("runner failed after {attempts} restarts: {source}")]
    RetriesExhausted {
        /// Number of restarts attempted.
        attempts: u32,
        /// The last failure.
        #[source]
        source: Box<WorkerError>,
    },

    /// A runner task panicked.
    #[error("runner panicked: {0}")]
    Panicked(String),

    /// A runner task was cancelled before completing.
    #[error("runner cancelled")]
    Cancelled,
}

impl WorkerError {
    /// Create a retries-exhausted error.
    pub fn retries_exhausted(attempts: u32, source: WorkerError) -> Self {
        Self::RetriesExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// Converts a task join failure.
    pub fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            let reason = err
                .into_panic()
                .downcast::<String>()
                .map(|s| *s)
                .or_else(|payload| payload.downcast::<&'static str>().map(|s| (*s).to_string()))
                .unwrap_or_else(|_| "unknown panic".to_string());
            Self::Panicked(reason)
        } else {
            Self::Cancelled
        }
    }

    /// Returns `true` if a restart may help.
    ///
    /// Broker failures surfaced through registration keep the kind of the
    /// underlying [`BrokerError`].
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Broker(err) => err.is_transient(),
            Self::Dispatch(HeraldError::Broker {
                source: Some(source),
                ..
            }) => source.downcast_ref::<BrokerError>().map_or(true, BrokerError::is_transient),
            Self::Dispatch(err) => err.is_retryable(),
            Self::Panicked(_) | Self::RetriesExhausted { .. } | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_display() {
        let err = WorkerError::retries_exhausted(3, BrokerError::Closed.into());
        assert_eq!(err.to_string(), "runner failed after 3 restarts: broker failure: broker closed");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_is_transient() {
        assert!(WorkerError::from(BrokerError::Unavailable("down".into())).is_transient());
        assert!(!WorkerError::from(BrokerError::NoSuchKey("k".into())).is_transient());
        assert!(WorkerError::from(HeraldError::broker("down")).is_transient());
        assert!(!WorkerError::Cancelled.is_transient());
        assert!(!WorkerError::Panicked("boom".into()).is_transient());
    }

    #[test]
    fn test_wrapped_broker_error_keeps_its_kind() {
        let offline = HeraldError::from(BrokerError::Unavailable("down".into()));
        assert!(WorkerError::from(offline).is_transient());

        let missing = HeraldError::from(BrokerError::NoSuchGroup {
            key: "evt:ping".into(),
            group: "svcA".into(),
        });
        assert!(!WorkerError::from(missing).is_transient());
    }

    #[tokio::test]
    async fn test_from_join_panic() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err = WorkerError::from_join(handle.await.unwrap_err());
        assert!(matches!(err, WorkerError::Panicked(ref reason) if reason == "boom"));
    }

    #[tokio::test]
    async fn test_from_join_cancelled() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let err = WorkerError::from_join(handle.await.unwrap_err());
        assert!(matches!(err, WorkerError::Cancelled));
    }
}
