//! Stream data model: ids, entries, records and group bookkeeping.

use crate::error::BrokerError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Record field holding the stream key.
pub const FIELD_KEY: &str = "Key";
/// Record field holding the append time in unix milliseconds.
pub const FIELD_TIMESTAMP: &str = "Timestamp";
/// Record field holding the serialized envelope.
pub const FIELD_DATA: &str = "Data";

/// Broker-assigned entry id, `<millis>-<sequence>`.
///
/// Ids are totally ordered and strictly increase within a stream.
///
/// ```
/// use herald_queue::StreamId;
///
/// let id: StreamId = "1700000000000-3".parse().unwrap();
/// assert_eq!(id.millis(), 1_700_000_000_000);
/// assert_eq!(id.sequence(), 3);
/// assert!(id < "1700000000001-0".parse::<StreamId>().unwrap());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    millis: u64,
    sequence: u64,
}

impl StreamId {
    /// The smallest id, `0-0`.
    pub const ZERO: Self = Self::new(0, 0);

    /// Creates an id from its parts.
    #[must_use]
    pub const fn new(millis: u64, sequence: u64) -> Self {
        Self { millis, sequence }
    }

    /// Millisecond part.
    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }

    /// Sequence part.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the next id for an append at `now_millis`.
    #[must_use]
    pub const fn next_after(&self, now_millis: u64) -> Self {
        if now_millis > self.millis {
            Self::new(now_millis, 0)
        } else {
            Self::new(self.millis, self.sequence + 1)
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.sequence)
    }
}

impl FromStr for StreamId {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BrokerError::InvalidStreamId(s.to_string());
        let (millis, sequence) = match s.split_once('-') {
            Some((millis, sequence)) => (millis, sequence),
            None => (s, "0"),
        };
        Ok(Self::new(
            millis.parse().map_err(|_| invalid())?,
            sequence.parse().map_err(|_| invalid())?,
        ))
    }
}

/// One end of an id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdBound {
    /// The smallest possible id (`-`).
    Min,
    /// The largest possible id (`+`).
    Max,
    /// Include the given id.
    Inclusive(StreamId),
    /// Exclude the given id (`(` prefix).
    Exclusive(StreamId),
}

impl IdBound {
    /// Returns `true` if `id` is at or after this bound used as a range start.
    #[must_use]
    pub fn admits_from(&self, id: StreamId) -> bool {
        match self {
            Self::Min => true,
            Self::Max => false,
            Self::Inclusive(start) => id >= *start,
            Self::Exclusive(start) => id > *start,
        }
    }

    /// Returns `true` if `id` is at or before this bound used as a range end.
    #[must_use]
    pub fn admits_to(&self, id: StreamId) -> bool {
        match self {
            Self::Min => false,
            Self::Max => true,
            Self::Inclusive(end) => id <= *end,
            Self::Exclusive(end) => id < *end,
        }
    }
}

impl fmt::Display for IdBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => f.write_str("-"),
            Self::Max => f.write_str("+"),
            Self::Inclusive(id) => write!(f, "{id}"),
            Self::Exclusive(id) => write!(f, "({id}"),
        }
    }
}

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Only entries appended after creation (`$`).
    Newest,
    /// Every entry in the stream (`0`).
    Beginning,
}

/// A raw stream entry as stored by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Entry id.
    pub id: StreamId,
    /// Field/value pairs in append order.
    pub fields: Vec<(String, Bytes)>,
}

impl StreamEntry {
    /// Returns the value of the named field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields
            .iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }
}

/// A stream entry decoded into its Herald fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// The stream key the record was appended to.
    pub key: String,
    /// Append time in unix milliseconds.
    pub timestamp: i64,
    /// Broker-assigned id; the ack and claim token.
    pub stream_id: StreamId,
    /// The serialized envelope. Empty when the entry carried no data.
    pub data: Bytes,
}

impl StreamRecord {
    /// Builds the field list appended for a record.
    #[must_use]
    pub fn fields(key: &str, timestamp: i64, data: Bytes) -> Vec<(String, Bytes)> {
        vec![
            (FIELD_KEY.to_string(), Bytes::copy_from_slice(key.as_bytes())),
            (FIELD_TIMESTAMP.to_string(), Bytes::from(timestamp.to_string())),
            (FIELD_DATA.to_string(), data),
        ]
    }

    /// Decodes a raw entry. Missing fields decode as empty values.
    #[must_use]
    pub fn from_entry(entry: &StreamEntry) -> Self {
        let key = entry
            .field(FIELD_KEY)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default();
        let timestamp = entry
            .field(FIELD_TIMESTAMP)
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            key,
            timestamp,
            stream_id: entry.id,
            data: entry.field(FIELD_DATA).cloned().unwrap_or_default(),
        }
    }

    /// Returns `true` if the record carries no envelope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An entry in a consumer group's pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Entry id.
    pub id: StreamId,
    /// Consumer currently owning the entry.
    pub consumer: String,
    /// Time since the entry was last delivered.
    pub idle: Duration,
    /// Number of times the entry has been delivered.
    pub delivery_count: u64,
}

/// A consumer within a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    /// Consumer name.
    pub name: String,
    /// Number of entries pending for this consumer.
    pub pending: usize,
    /// Time since the consumer last read or claimed.
    pub idle: Duration,
}

/// A consumer group on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Number of consumers.
    pub consumers: usize,
    /// Number of pending entries.
    pub pending: usize,
    /// Id of the last entry delivered to the group.
    pub last_delivered_id: StreamId,
}
