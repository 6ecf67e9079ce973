//! Kafka-style record types for Tideline.
//!
//! Records are what a browsing page is made of. They follow the Kafka record
//! layout with key, value, headers and timestamp, and additionally carry the
//! partition they were read from so a merged page stays self-describing.
//!
//! # Record Format
//!
//! Each record contains:
//! - **Partition**: Partition the record was read from
//! - **Offset**: Position in the partition log (assigned by the broker)
//! - **Timestamp**: When the record was created (client or broker time)
//! - **Key**: Optional key for partitioning and compaction
//! - **Value**: The actual message payload
//! - **Headers**: Ordered key-value metadata

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::PartitionId;

/// A record header (key-value metadata).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header key.
    pub key: Bytes,
    /// Header value.
    pub value: Bytes,
}

impl Header {
    /// Creates a new header.
    #[must_use]
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the encoded size of this header.
    #[must_use]
    pub const fn encoded_size(&self) -> usize {
        4 + self.key.len() + 4 + self.value.len()
    }
}

/// Timestamp type for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Timestamps won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Offset in a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the previous offset, or `None` at offset zero.
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Returns the offset for "earliest" (beginning of log).
    #[must_use]
    pub const fn earliest() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single record in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Partition the record belongs to.
    pub partition: PartitionId,
    /// Offset in the partition.
    pub offset: Offset,
    /// Timestamp of the record.
    pub timestamp: Timestamp,
    /// Optional key for partitioning and compaction.
    pub key: Option<Bytes>,
    /// The record value/payload.
    pub value: Bytes,
    /// Ordered headers.
    pub headers: Vec<Header>,
}

impl Record {
    /// Creates a new record with just a value.
    #[must_use]
    pub fn new(partition: PartitionId, offset: Offset, value: impl Into<Bytes>) -> Self {
        Self {
            partition,
            offset,
            timestamp: Timestamp::now(),
            key: None,
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Sets the key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Returns the approximate size of the record in bytes.
    ///
    /// This is the cost charged against read and scan byte budgets.
    #[must_use]
    pub fn size(&self) -> usize {
        let key_size = self.key.as_ref().map_or(0, Bytes::len);
        let headers_size: usize = self.headers.iter().map(Header::encoded_size).sum();
        8 + 8 + 4 + key_size + 4 + self.value.len() + 4 + headers_size
    }

    /// Returns the merge key used to order records across partitions.
    ///
    /// Ties on timestamp are broken by partition, then offset, so the
    /// ordering never depends on the data beyond these three fields.
    #[must_use]
    pub const fn sort_key(&self) -> (Timestamp, PartitionId, Offset) {
        (self.timestamp, self.partition, self.offset)
    }
}
