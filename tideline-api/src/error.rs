//! API error types.

use tideline_browser::BrowseError;

/// Message returned when a cursor can't be honoured.
pub const PAGINATION_EXPIRED: &str = "pagination expired, restart browsing";

/// Errors returned by the `topic/data` endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No browser registered for the cluster.
    #[error("cluster not found: {cluster}")]
    ClusterNotFound {
        /// The cluster id.
        cluster: String,
    },

    /// The topic does not exist.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// The topic name.
        topic: String,
    },

    /// The request is malformed or out of bounds.
    #[error("bad request: {message}")]
    BadRequest {
        /// Error description.
        message: String,
    },

    /// The `after` token can't be used any more.
    #[error("{} ({reason})", PAGINATION_EXPIRED)]
    PaginationExpired {
        /// Why the token was rejected.
        reason: String,
    },

    /// The broker could not serve the request.
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ClusterNotFound { .. } | Self::TopicNotFound { .. } => 404,
            Self::BadRequest { .. } => 400,
            Self::PaginationExpired { .. } => 410,
            Self::Unavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }
}

impl From<BrowseError> for ApiError {
    fn from(err: BrowseError) -> Self {
        match err {
            BrowseError::InvalidCursor { reason } => Self::PaginationExpired {
                reason: reason.to_string(),
            },
            BrowseError::TopicNotFound { topic } => Self::TopicNotFound { topic },
            BrowseError::InvalidOptions { message } => Self::BadRequest { message },
            err @ (BrowseError::PartitionUnavailable { .. }
            | BrowseError::MetadataUnavailable { .. }) => Self::Unavailable {
                message: err.to_string(),
            },
            BrowseError::Internal { message } => Self::Internal { message },
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
