//! Request context types.
//!
//! The [`RequestContext`] carries per-dispatch state into pipelines and
//! handlers: the correlation id, the forwarded credential, the consumer that
//! delivered a distributed request, and the cancellation token.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Correlation identifier for a request.
///
/// Locally created ids are UUID v7 strings. Ids restored from a message
/// envelope are kept verbatim, whatever their format.
///
/// # Example
///
/// ```
/// use herald_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.as_str().len(), 36);
///
/// let forwarded = RequestId::from_string("upstream-42");
/// assert_eq!(forwarded.to_string(), "upstream-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an id received from elsewhere.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

/// The consumer that delivered a distributed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Consumer group of the sending process.
    pub group_name: String,
    /// Machine name of the sending process.
    pub machine_name: String,
}

/// Per-dispatch context passed to pipelines and handlers.
///
/// # Example
///
/// ```
/// use herald_core::RequestContext;
///
/// let ctx = RequestContext::new().with_authorization("Bearer abc");
/// assert_eq!(ctx.authorization(), Some("Bearer abc"));
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for this dispatch.
    request_id: RequestId,

    /// Opaque credential forwarded with distributed requests.
    authorization: Option<String>,

    /// Sender of a distributed request, if any.
    origin: Option<Origin>,

    /// Cancelled when the host shuts down.
    cancellation: CancellationToken,

    /// When the dispatch started.
    started_at: Instant,
}

impl RequestContext {
    /// Creates a new context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a new context with the specified request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            authorization: None,
            origin: None,
            cancellation: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the forwarded credential, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// Sets the forwarded credential.
    pub fn set_authorization(&mut self, authorization: impl Into<String>) {
        self.authorization = Some(authorization.into());
    }

    /// Returns a new context with the specified credential.
    #[must_use]
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Returns the sender of a distributed request.
    #[must_use]
    pub const fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Returns a new context recording the sender of a distributed request.
    #[must_use]
    pub fn with_origin(mut self, group_name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        self.origin = Some(Origin {
            group_name: group_name.into(),
            machine_name: machine_name.into(),
        });
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns a new context bound to the given cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns `true` once the host has requested shutdown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the elapsed time since the dispatch started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_new_generates_unique_ids() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2, "Each RequestId should be unique");
    }

    #[test]
    fn test_forwarded_request_id_is_verbatim() {
        let id = RequestId::from_string("trace-0001");
        assert_eq!(id.as_str(), "trace-0001");
        let json = serde_json::to_string(&id).expect("serialization should work");
        assert_eq!(json, "\"trace-0001\"");
    }

    #[test]
    fn test_request_context_defaults() {
        let ctx = RequestContext::new();
        assert!(ctx.authorization().is_none());
        assert!(ctx.origin().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_request_context_builder_pattern() {
        let ctx = RequestContext::with_request_id(RequestId::from_string("r-1"))
            .with_authorization("Bearer token")
            .with_origin("billing", "host-a");

        assert_eq!(ctx.request_id().as_str(), "r-1");
        assert_eq!(ctx.authorization(), Some("Bearer token"));
        assert_eq!(ctx.origin().map(|o| o.group_name.as_str()), Some("billing"));
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new().with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
