//! Broker error types.

use tideline_core::{Offset, PartitionId};

/// Broker error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Topic not found.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// The topic name.
        topic: String,
    },

    /// Partition not found.
    #[error("{partition} not found in topic {topic}")]
    PartitionNotFound {
        /// The topic name.
        topic: String,
        /// The partition.
        partition: PartitionId,
    },

    /// Offset out of range.
    #[error("offset {offset} out of range [{earliest}, {latest})")]
    OffsetOutOfRange {
        /// The requested offset.
        offset: Offset,
        /// First available offset.
        earliest: Offset,
        /// Log end offset.
        latest: Offset,
    },

    /// The broker could not be reached for this partition.
    #[error("{partition} unavailable: {message}")]
    Unavailable {
        /// The partition.
        partition: PartitionId,
        /// Error description.
        message: String,
    },

    /// The operation did not complete within its timeout.
    #[error("timeout: {operation} after {waited_ms}ms")]
    Timeout {
        /// What operation timed out.
        operation: &'static str,
        /// How long we waited.
        waited_ms: u64,
    },
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
