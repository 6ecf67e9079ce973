//! Page request options and page results.

use tideline_core::{PartitionId, Record, Timestamp};

use crate::cursor::PageCursor;
use crate::predicate::SearchPredicate;

/// Direction in which a page walks the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Oldest records first.
    #[default]
    Asc,
    /// Newest records first.
    Desc,
}

impl SortDirection {
    /// Returns the wire tag used in cursor tokens.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Asc => 0,
            Self::Desc => 1,
        }
    }

    /// Parses a wire tag.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Asc),
            1 => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Options for one page fetch.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Sort direction.
    pub sort: SortDirection,
    /// Restrict the scan to a single partition.
    pub partition: Option<PartitionId>,
    /// Only records at or after this timestamp.
    pub timestamp_lower_bound: Option<Timestamp>,
    /// Search filter applied to merged records.
    pub search: SearchPredicate,
    /// Continuation token returned by the previous page.
    pub cursor: Option<String>,
    /// Legacy page number hint. The cursor's page index wins.
    pub page_number: Option<u32>,
    /// Requested page size; the configured default when absent.
    pub page_size: Option<u32>,
}

impl PageOptions {
    /// Creates options for a first page with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort direction.
    #[must_use]
    pub const fn with_sort(mut self, sort: SortDirection) -> Self {
        self.sort = sort;
        self
    }

    /// Restricts the scan to one partition.
    #[must_use]
    pub const fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Sets the timestamp lower bound.
    #[must_use]
    pub const fn with_timestamp_lower_bound(mut self, timestamp: Timestamp) -> Self {
        self.timestamp_lower_bound = Some(timestamp);
        self
    }

    /// Sets the search predicate.
    #[must_use]
    pub fn with_search(mut self, search: SearchPredicate) -> Self {
        self.search = search;
        self
    }

    /// Sets the continuation token.
    #[must_use]
    pub fn with_cursor(mut self, token: impl Into<String>) -> Self {
        self.cursor = Some(token.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the legacy page number hint.
    #[must_use]
    pub const fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }
}

/// Where the next page starts: the decoded cursor and its opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// Decoded cursor.
    pub cursor: PageCursor,
    /// Opaque token to hand back to the caller.
    pub token: String,
}

/// One page of records.
#[derive(Debug, Clone)]
pub struct Page {
    /// Records in sort order, at most the page size.
    pub records: Vec<Record>,
    /// Continuation; absent once every partition is exhausted.
    pub next: Option<Continuation>,
    /// True if a partition ran out of time before filling its budget or
    /// reaching the log end. More data may exist even if the page is short.
    pub partial: bool,
    /// 1-based index of this page within the browsing session.
    pub page_number: u32,
    /// Records left in the scanned range when the page was fetched.
    pub remaining_estimate: u64,
}

impl Page {
    /// Returns the continuation token, if any.
    #[must_use]
    pub fn next_token(&self) -> Option<&str> {
        self.next.as_ref().map(|next| next.token.as_str())
    }

    /// Returns true if there is nothing left to browse.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}
