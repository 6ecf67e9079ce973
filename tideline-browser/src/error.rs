//! Browsing error types.

use tideline_broker::BrokerError;
use tideline_core::PartitionId;

/// Errors returned by a page fetch.
///
/// Running out of time is not an error: a page cut short by the deadline is
/// returned with `partial = true`.
#[derive(Debug, thiserror::Error)]
pub enum BrowseError {
    /// The cursor token is malformed, tampered with, or was issued for a
    /// different topic or partition set.
    #[error("invalid cursor: {reason}")]
    InvalidCursor {
        /// Why the token was rejected.
        reason: &'static str,
    },

    /// A partition under scan could not report offsets or be read.
    #[error("{partition} of topic {topic} unavailable: {source}")]
    PartitionUnavailable {
        /// The topic name.
        topic: String,
        /// The failing partition.
        partition: PartitionId,
        /// The broker failure.
        source: BrokerError,
    },

    /// The topic's partition list could not be fetched.
    #[error("metadata for topic {topic} unavailable: {source}")]
    MetadataUnavailable {
        /// The topic name.
        topic: String,
        /// The broker failure.
        source: BrokerError,
    },

    /// The topic does not exist.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// The topic name.
        topic: String,
    },

    /// The page options are out of bounds or conflict with the cursor.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// Error description.
        message: String,
    },

    /// A poller task panicked or was cancelled unexpectedly.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl BrowseError {
    pub(crate) fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    pub(crate) fn partition_unavailable(
        topic: &str,
        partition: PartitionId,
        source: BrokerError,
    ) -> Self {
        match source {
            BrokerError::TopicNotFound { topic } => Self::TopicNotFound { topic },
            source => Self::PartitionUnavailable {
                topic: topic.to_string(),
                partition,
                source,
            },
        }
    }
}

/// Result type for browsing operations.
pub type BrowseResult<T> = Result<T, BrowseError>;
