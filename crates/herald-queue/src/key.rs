//! Stream key scheme.
//!
//! Keys are lower-cased, colon-joined concatenations of their non-blank
//! segments. Inside each segment every run of characters outside
//! `[a-z0-9._-]` collapses to a single `_`, so the same inputs always map to
//! the same key across processes and restarts.
//!
//! | Stream | Key |
//! |---|---|
//! | Requests for `Ping` | `stream_key(prefix, None, "Ping")` |
//! | Replies for group `svcA` | `stream_key(prefix, Some("svcA"), "Ping")` |
//! | Notification channel | `stream_key(prefix, None, channel)` |

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized stream key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    /// Wraps an already normalized key.
    #[must_use]
    pub fn from_normalized(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StreamKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StreamKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Builds the stream key for a type identity.
///
/// ```
/// use herald_queue::stream_key;
///
/// assert_eq!(stream_key(Some("evt"), None, "Ping"), "evt:ping");
/// assert_eq!(stream_key(Some("evt"), Some("svcA"), "Ping"), "evt:svca:ping");
/// assert_eq!(stream_key(None, Some(" "), "Orders::Create<V2>"), "orders_create_v2_");
/// ```
#[must_use]
pub fn stream_key(prefix: Option<&str>, namespace: Option<&str>, identity: &str) -> StreamKey {
    let key = [prefix, namespace, Some(identity)]
        .into_iter()
        .flatten()
        .filter(|segment| !segment.trim().is_empty())
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join(":");
    StreamKey(key)
}

/// Lower-cases a segment and collapses disallowed runs to `_`.
#[must_use]
pub fn normalize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut in_run = false;
    for c in segment.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}
