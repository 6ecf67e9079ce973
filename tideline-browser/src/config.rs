//! Browser configuration.
//!
//! Every per-request resource is bounded here: page size, wall-clock time,
//! bytes and records per broker read, and the total scan budget shared by the
//! pollers of one page.

use std::time::Duration;

use crate::error::{BrowseError, BrowseResult};

/// Secret used when none is configured. Tokens signed with it are only
/// tamper-evident against clients that don't know it.
const DEFAULT_CURSOR_SECRET: &[u8] = b"tideline-default-cursor-secret";

/// Configuration for a [`crate::RecordBrowser`].
#[derive(Clone)]
pub struct BrowserConfig {
    /// Page size used when the request doesn't name one.
    pub default_page_size: u32,
    /// Smallest accepted page size.
    pub min_page_size: u32,
    /// Largest accepted page size.
    pub max_page_size: u32,
    /// Wall-clock time a page fetch may spend polling.
    pub poll_timeout: Duration,
    /// Maximum records requested per broker read.
    pub max_records_per_read: u32,
    /// Maximum bytes requested per broker read.
    pub max_bytes_per_read: u64,
    /// Records all pollers of one page may examine in total.
    pub scan_records_max: u64,
    /// Bytes all pollers of one page may examine in total.
    pub scan_bytes_max: u64,
    /// Key authenticating cursor tokens. Must be stable across restarts.
    pub cursor_secret: Vec<u8>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            min_page_size: 1,
            max_page_size: 1000,
            poll_timeout: Duration::from_secs(1),
            max_records_per_read: 500,
            max_bytes_per_read: 1024 * 1024,     // 1 MB
            scan_records_max: 10_000,
            scan_bytes_max: 16 * 1024 * 1024, // 16 MB
            cursor_secret: DEFAULT_CURSOR_SECRET.to_vec(),
        }
    }
}

impl std::fmt::Debug for BrowserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserConfig")
            .field("default_page_size", &self.default_page_size)
            .field("min_page_size", &self.min_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("poll_timeout", &self.poll_timeout)
            .field("max_records_per_read", &self.max_records_per_read)
            .field("max_bytes_per_read", &self.max_bytes_per_read)
            .field("scan_records_max", &self.scan_records_max)
            .field("scan_bytes_max", &self.scan_bytes_max)
            .field("cursor_secret", &"<redacted>")
            .finish()
    }
}

impl BrowserConfig {
    /// Creates a config with small budgets and a short timeout for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_timeout: Duration::from_millis(200),
            max_records_per_read: 4,
            max_bytes_per_read: 64 * 1024,
            scan_records_max: 1_000,
            scan_bytes_max: 1024 * 1024,
            cursor_secret: b"tideline-test-secret".to_vec(),
            ..Self::default()
        }
    }

    /// Sets the page size bounds and default.
    #[must_use]
    pub const fn with_page_sizes(mut self, min: u32, default: u32, max: u32) -> Self {
        self.min_page_size = min;
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    /// Sets the poll timeout.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the per-read limits.
    #[must_use]
    pub const fn with_read_limits(mut self, max_records: u32, max_bytes: u64) -> Self {
        self.max_records_per_read = max_records;
        self.max_bytes_per_read = max_bytes;
        self
    }

    /// Sets the scan budget shared by the pollers of one page.
    #[must_use]
    pub const fn with_scan_budget(mut self, records: u64, bytes: u64) -> Self {
        self.scan_records_max = records;
        self.scan_bytes_max = bytes;
        self
    }

    /// Sets the cursor secret.
    #[must_use]
    pub fn with_cursor_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.cursor_secret = secret.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if any bound is zero or the bounds are inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                message: "min_page_size must be positive".to_string(),
            });
        }

        if self.default_page_size < self.min_page_size
            || self.default_page_size > self.max_page_size
        {
            return Err(ConfigError::InvalidPageSize {
                message: "default_page_size must be within [min_page_size, max_page_size]"
                    .to_string(),
            });
        }

        if self.poll_timeout.is_zero() {
            return Err(ConfigError::InvalidBudget {
                message: "poll_timeout must be positive".to_string(),
            });
        }

        if self.max_records_per_read == 0 || self.max_bytes_per_read == 0 {
            return Err(ConfigError::InvalidBudget {
                message: "per-read limits must be positive".to_string(),
            });
        }

        // A full page must fit in the scan budget.
        if self.scan_records_max < u64::from(self.max_page_size) {
            return Err(ConfigError::InvalidBudget {
                message: "scan_records_max must be >= max_page_size".to_string(),
            });
        }

        if self.scan_bytes_max < self.max_bytes_per_read {
            return Err(ConfigError::InvalidBudget {
                message: "scan_bytes_max must be >= max_bytes_per_read".to_string(),
            });
        }

        if self.cursor_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        Ok(())
    }

    /// Resolves a requested page size against the configured bounds.
    ///
    /// # Errors
    /// Returns `InvalidOptions` if the size is outside `[min, max]`.
    pub fn resolve_page_size(&self, requested: Option<u32>) -> BrowseResult<u32> {
        let size = requested.unwrap_or(self.default_page_size);
        if size < self.min_page_size || size > self.max_page_size {
            return Err(BrowseError::invalid_options(format!(
                "page size {size} outside [{}, {}]",
                self.min_page_size, self.max_page_size
            )));
        }
        Ok(size)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Page size bounds are inconsistent.
    InvalidPageSize {
        /// Error description.
        message: String,
    },
    /// A time, byte or record budget is invalid.
    InvalidBudget {
        /// Error description.
        message: String,
    },
    /// No cursor secret configured.
    MissingSecret,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageSize { message } => write!(f, "invalid page size: {message}"),
            Self::InvalidBudget { message } => write!(f, "invalid budget: {message}"),
            Self::MissingSecret => write!(f, "cursor secret must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
