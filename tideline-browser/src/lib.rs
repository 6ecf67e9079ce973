//! Tideline Browser - Paginated, filterable browsing of topic records.
//!
//! A [`RecordBrowser`] turns one page request into a bounded amount of
//! broker work:
//!
//! - one [`PartitionPoller`] per partition, all sharing a wall-clock deadline
//!   and a [`ScanBudget`]
//! - a deterministic k-way merge of the per-partition runs
//! - a [`SearchPredicate`] applied to the merged records
//! - an opaque, authenticated continuation token produced by [`CursorCodec`]
//!
//! Pagination is stateless. Everything needed to resume lives in the token.
//!
//! # Example
//!
//! ```ignore
//! let browser = RecordBrowser::new(broker, BrowserConfig::default())?;
//! let first = browser.fetch_page("orders", PageOptions::new()).await?;
//! if let Some(token) = first.next_token() {
//!     let second = browser
//!         .fetch_page("orders", PageOptions::new().with_cursor(token))
//!         .await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod browser;
mod budget;
mod config;
mod cursor;
mod error;
mod merge;
mod page;
mod poller;
mod predicate;

pub use browser::RecordBrowser;
pub use budget::{fair_share, BudgetShare, ScanBudget};
pub use config::{BrowserConfig, ConfigError};
pub use cursor::{CursorCodec, CursorScope, PageCursor, PartitionCursor};
pub use error::{BrowseError, BrowseResult};
pub use merge::MergeIter;
pub use page::{Continuation, Page, PageOptions, SortDirection};
pub use poller::{PartitionPoller, PollOutcome, PollRequest, PollStatus};
pub use predicate::{SearchClause, SearchOp, SearchPredicate, SearchTarget};
