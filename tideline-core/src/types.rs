//! Strongly-typed identifiers for Tideline entities.

use std::fmt;

/// Identifier of a partition within a topic.
///
/// Wraps a u64 so a partition can't be confused with an offset or a count.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PartitionId(u64);

impl PartitionId {
    /// Creates a new partition id from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition-{}", self.0)
    }
}

impl From<u64> for PartitionId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<PartitionId> for u64 {
    fn from(id: PartitionId) -> Self {
        id.get()
    }
}
