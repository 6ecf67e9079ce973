//! Broker client trait abstraction.
//!
//! Production deployments put a real Kafka client behind this trait; tests
//! and the CLI use [`crate::MemoryBroker`].
//!
//! # Contract
//!
//! - Reads are forward-only and bounded by record count, bytes and time.
//! - A read returns at least one record whenever one exists at or after the
//!   requested offset, even if that record alone exceeds `max_bytes`.
//! - Retries are the implementation's concern. Callers treat every error as
//!   final for the request at hand.

use std::time::Duration;

use async_trait::async_trait;
use tideline_core::{Offset, PartitionId, Record, Timestamp};

use crate::error::BrokerResult;

/// Earliest and latest offsets of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetBounds {
    /// First offset still retained.
    pub earliest: Offset,
    /// Log end offset (the offset the next appended record will get).
    pub latest: Offset,
}

impl OffsetBounds {
    /// Creates offset bounds.
    #[must_use]
    pub const fn new(earliest: Offset, latest: Offset) -> Self {
        Self { earliest, latest }
    }

    /// Returns true if the partition retains no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest <= self.earliest
    }

    /// Returns the number of retained records.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.latest.get().saturating_sub(self.earliest.get())
    }
}

/// A bounded read request for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Partition to read from.
    pub partition: PartitionId,
    /// First offset to read.
    pub offset: Offset,
    /// Maximum number of records to return.
    pub max_records: u32,
    /// Soft byte limit for the returned records.
    pub max_bytes: u64,
    /// How long the broker may take.
    pub timeout: Duration,
}

/// Result of a bounded read.
#[derive(Debug, Clone, Default)]
pub struct ReadBatch {
    /// Records in offset order.
    pub records: Vec<Record>,
    /// Offset to continue reading from.
    pub next_offset: Offset,
    /// True if the read reached the log end offset.
    pub hit_log_end: bool,
}

/// Trait for the log broker queried by the browsing engine.
///
/// Implementations must be `Send + Sync` because one instance is shared by
/// every partition poller of every request.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Lists the partitions of a topic in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is unknown or the broker is unreachable.
    async fn list_partitions(&self, topic: &str) -> BrokerResult<Vec<PartitionId>>;

    /// Returns the earliest and latest offsets of a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition is unknown or cannot report offsets.
    async fn offset_bounds(&self, topic: &str, partition: PartitionId)
        -> BrokerResult<OffsetBounds>;

    /// Returns the first offset whose record timestamp is at or after `timestamp`.
    ///
    /// Returns `None` when no such record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition is unknown or unreachable.
    async fn offset_for_timestamp(
        &self,
        topic: &str,
        partition: PartitionId,
        timestamp: Timestamp,
    ) -> BrokerResult<Option<Offset>>;

    /// Reads records forward from `request.offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition is unknown, the offset is below the
    /// retention boundary, the broker fails, or the timeout elapses.
    async fn read(&self, topic: &str, request: ReadRequest) -> BrokerResult<ReadBatch>;
}
