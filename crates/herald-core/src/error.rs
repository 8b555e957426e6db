//! Error types for Herald.
//!
//! This module provides the [`HeraldError`] type, the standard error type
//! returned by handlers, pipelines and the dispatcher.
//!
//! Errors fall into two broad groups:
//!
//! | Group | Variants | Behaviour |
//! |---|---|---|
//! | Configuration | `UnknownRequest`, `TypeMismatch` | Fatal to the calling path, never retried |
//! | Runtime | `Handler`, `Validation`, `Codec`, `Broker`, `Cancelled`, `Internal` | Surfaced to the caller or captured into a reply |

use crate::service_map::HandlerKind;
use thiserror::Error;

/// Result type alias using [`HeraldError`].
pub type HeraldResult<T> = Result<T, HeraldError>;

/// Standard error type for Herald.
///
/// # Example
///
/// ```
/// use herald_core::HeraldError;
///
/// fn check_quantity(quantity: u32) -> Result<(), HeraldError> {
///     if quantity == 0 {
///         return Err(HeraldError::validation("quantity must be positive"));
///     }
///     Ok(())
/// }
///
/// assert!(check_quantity(0).is_err());
/// ```
#[derive(Error, Debug)]
pub enum HeraldError {
    /// No handler of the requested kind is registered for the request type.
    #[error("no {kind} handler registered for '{service_type}'")]
    UnknownRequest {
        /// Type identity of the request.
        service_type: String,
        /// The handler kind that was looked up.
        kind: HandlerKind,
    },

    /// A value did not have the type the registry expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected type name.
        expected: &'static str,
        /// The type name that was found.
        found: String,
    },

    /// A handler reported a failure.
    #[error("{message}")]
    Handler {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Request validation failed.
    #[error("validation failed: {message}")]
    Validation {
        /// Summary message.
        message: String,
        /// Individual validation failures.
        failures: Vec<String>,
    },

    /// A value could not be serialized or deserialized.
    #[error("codec error for {type_name}: {source}")]
    Codec {
        /// The type being encoded or decoded.
        type_name: &'static str,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The broker rejected or failed an operation.
    #[error("broker error: {message}")]
    Broker {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HeraldError {
    /// Creates an unknown-request error.
    #[must_use]
    pub fn unknown_request(service_type: impl Into<String>, kind: HandlerKind) -> Self {
        Self::UnknownRequest {
            service_type: service_type.into(),
            kind,
        }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Creates a handler error with a message.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error with a source error.
    pub fn handler_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Handler {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a validation error without individual failures.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            failures: Vec::new(),
        }
    }

    /// Creates a validation error carrying individual failures.
    #[must_use]
    pub fn validation_with_failures(message: impl Into<String>, failures: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            failures,
        }
    }

    /// Creates a codec error for the given type.
    #[must_use]
    pub fn codec<T: ?Sized>(source: serde_json::Error) -> Self {
        Self::Codec {
            type_name: std::any::type_name::<T>(),
            source,
        }
    }

    /// Creates a broker error.
    #[must_use]
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a broker error with a source error.
    pub fn broker_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Broker {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns `true` for errors caused by how the mediator was wired.
    ///
    /// These are returned immediately and never retried.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownRequest { .. } | Self::TypeMismatch { .. })
    }

    /// Returns `true` if repeating the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Broker { .. })
    }
}

impl From<crate::di::InjectionError> for HeraldError {
    fn from(err: crate::di::InjectionError) -> Self {
        Self::internal_with_source("handler resolution failed", err)
    }
}
