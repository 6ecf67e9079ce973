//! Property definitions and checkers for browsing tests.
//!
//! Properties are invariants a complete browsing session must satisfy. Each
//! checker returns the violations it found; an empty list means the property
//! holds.

use std::collections::BTreeMap;

use tideline_browser::SortDirection;
use tideline_core::{Offset, PartitionId, Record, Timestamp};

use crate::scenarios::BrowseRun;

/// Merge key of a record.
pub type SortKey = (Timestamp, PartitionId, Offset);

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a browsing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// A record was returned more than once.
    Duplicate {
        /// Partition of the record.
        partition: PartitionId,
        /// Offset of the record.
        offset: Offset,
        /// How often it was returned.
        times: usize,
    },
    /// An expected record was never returned.
    Missing {
        /// Partition of the record.
        partition: PartitionId,
        /// Offset of the record.
        offset: Offset,
    },
    /// A record was returned that should have been filtered out.
    Unexpected {
        /// Partition of the record.
        partition: PartitionId,
        /// Offset of the record.
        offset: Offset,
    },
    /// Two consecutive records are in the wrong order.
    OutOfOrder {
        /// Position of the second record in the session.
        position: usize,
        /// Key of the first record.
        before: SortKey,
        /// Key of the second record.
        after: SortKey,
    },
    /// Descending session isn't the exact reverse of the ascending one.
    NotReversed {
        /// First position where the sessions disagree.
        position: usize,
    },
    /// A page holds more records than the page size.
    PageTooLarge {
        /// Page number.
        page: u32,
        /// Records on the page.
        len: usize,
        /// Requested page size.
        page_size: u32,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate {
                partition,
                offset,
                times,
            } => write!(f, "{partition} offset {offset} returned {times} times"),
            Self::Missing { partition, offset } => {
                write!(f, "{partition} offset {offset} never returned")
            }
            Self::Unexpected { partition, offset } => {
                write!(f, "{partition} offset {offset} returned but not expected")
            }
            Self::OutOfOrder {
                position,
                before,
                after,
            } => write!(
                f,
                "records out of order at position {position}: {before:?} then {after:?}"
            ),
            Self::NotReversed { position } => {
                write!(f, "descending session differs from reversed ascending at {position}")
            }
            Self::PageTooLarge {
                page,
                len,
                page_size,
            } => write!(f, "page {page} holds {len} records, page size is {page_size}"),
        }
    }
}

// ============================================================================
// Property Checkers
// ============================================================================

/// Checks that every expected record was returned exactly once and nothing
/// else was returned.
#[must_use]
pub fn check_exactly_once(seen: &[Record], expected: &[Record]) -> Vec<PropertyViolation> {
    let mut counts: BTreeMap<(PartitionId, Offset), usize> = BTreeMap::new();
    for record in seen {
        *counts.entry((record.partition, record.offset)).or_default() += 1;
    }

    let mut violations = Vec::new();
    for record in expected {
        match counts.remove(&(record.partition, record.offset)) {
            None => violations.push(PropertyViolation::Missing {
                partition: record.partition,
                offset: record.offset,
            }),
            Some(1) => {}
            Some(times) => violations.push(PropertyViolation::Duplicate {
                partition: record.partition,
                offset: record.offset,
                times,
            }),
        }
    }
    violations.extend(
        counts
            .into_keys()
            .map(|(partition, offset)| PropertyViolation::Unexpected { partition, offset }),
    );
    violations
}

/// Checks that a session is sorted by merge key in `direction`.
///
/// Only meaningful when every partition's timestamps are non-decreasing
/// and no page was cut short by the deadline or the scan budget.
#[must_use]
pub fn check_sorted(seen: &[Record], direction: SortDirection) -> Vec<PropertyViolation> {
    seen.windows(2)
        .enumerate()
        .filter_map(|(idx, pair)| {
            let (before, after) = (pair[0].sort_key(), pair[1].sort_key());
            let in_order = match direction {
                SortDirection::Asc => before < after,
                SortDirection::Desc => before > after,
            };
            (!in_order).then_some(PropertyViolation::OutOfOrder {
                position: idx + 1,
                before,
                after,
            })
        })
        .collect()
}

/// Checks that a descending session is the exact reverse of an ascending one.
#[must_use]
pub fn check_reversed(asc: &[Record], desc: &[Record]) -> Vec<PropertyViolation> {
    let ids = |r: &Record| (r.partition, r.offset);
    let position = asc
        .iter()
        .map(ids)
        .zip(desc.iter().rev().map(ids))
        .position(|(a, d)| a != d);

    match position {
        Some(position) => vec![PropertyViolation::NotReversed { position }],
        None if asc.len() != desc.len() => vec![PropertyViolation::NotReversed {
            position: asc.len().min(desc.len()),
        }],
        None => Vec::new(),
    }
}

/// Checks that no page exceeds the page size.
#[must_use]
pub fn check_page_bounds(run: &BrowseRun, page_size: u32) -> Vec<PropertyViolation> {
    run.pages
        .iter()
        .filter(|page| page.len > page_size as usize)
        .map(|page| PropertyViolation::PageTooLarge {
            page: page.page_number,
            len: page.len,
            page_size,
        })
        .collect()
}
