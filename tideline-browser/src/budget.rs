//! Scan budget shared by the pollers of one page fetch.
//!
//! The record budget is split in two: every poller gets a [`BudgetShare`]
//! set aside before any poller starts, and whatever is left forms a pool
//! that pollers draw from once their own share runs out. A fast partition
//! can therefore never starve the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Records and bytes the pollers of one page may still examine.
///
/// Pollers reserve records before a read and release what the read didn't
/// use; bytes are charged after the fact.
#[derive(Debug)]
pub struct ScanBudget {
    records: AtomicU64,
    bytes: AtomicU64,
}

impl ScanBudget {
    /// Creates a budget.
    #[must_use]
    pub const fn new(records: u64, bytes: u64) -> Self {
        Self {
            records: AtomicU64::new(records),
            bytes: AtomicU64::new(bytes),
        }
    }

    /// Reserves up to `wanted` records and returns how many were granted.
    pub fn reserve_records(&self, wanted: u64) -> u64 {
        let mut granted = 0;
        // Closure always returns Some, so the update cannot fail.
        let _ = self
            .records
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                granted = left.min(wanted);
                Some(left - granted)
            });
        granted
    }

    /// Returns unused records to the budget.
    pub fn release_records(&self, unused: u64) {
        if unused > 0 {
            self.records.fetch_add(unused, Ordering::AcqRel);
        }
    }

    /// Charges bytes read, saturating at zero.
    pub fn charge_bytes(&self, bytes: u64) {
        let _ = self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                Some(left.saturating_sub(bytes))
            });
    }

    /// Returns the records left.
    #[must_use]
    pub fn remaining_records(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    /// Returns the bytes left.
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Returns true once either counter is spent.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.remaining_records() == 0 || self.remaining_bytes() == 0
    }
}

/// Records set aside for each of `pollers` pollers out of `total`: an even
/// split capped at `cap`, and never less than one.
#[must_use]
pub fn fair_share(total: u64, pollers: usize, cap: u64) -> u64 {
    let pollers = u64::try_from(pollers.max(1)).unwrap_or(u64::MAX);
    (total / pollers).min(cap).max(1)
}

/// One poller's slice of a [`ScanBudget`].
///
/// Reserved records are spent first, then records from the shared pool.
/// Once the byte budget is spent the share only allows the poller's first
/// read, so every poller examines at least one record. Reserved records
/// left over go back to the pool when the share is dropped.
#[derive(Debug)]
pub struct BudgetShare {
    budget: Arc<ScanBudget>,
    reserved: u64,
    taken: bool,
}

impl BudgetShare {
    /// Creates a share holding `reserved` records of its own.
    #[must_use]
    pub const fn new(budget: Arc<ScanBudget>, reserved: u64) -> Self {
        Self {
            budget,
            reserved,
            taken: false,
        }
    }

    /// Takes up to `wanted` records and returns how many were granted.
    pub fn take(&mut self, wanted: u64) -> u64 {
        if self.taken && self.budget.remaining_bytes() == 0 {
            return 0;
        }
        let own = self.reserved.min(wanted);
        self.reserved -= own;
        let pooled = if own < wanted && !self.budget.is_drained() {
            self.budget.reserve_records(wanted - own)
        } else {
            0
        };
        let granted = own + pooled;
        self.taken |= granted > 0;
        granted
    }

    /// Keeps records a read didn't use for the next read.
    pub fn give_back(&mut self, unused: u64) {
        self.reserved = self.reserved.saturating_add(unused);
    }

    /// Charges bytes read to the shared budget.
    pub fn charge_bytes(&self, bytes: u64) {
        self.budget.charge_bytes(bytes);
    }

    /// Returns the bytes left in the shared budget.
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 {
        self.budget.remaining_bytes()
    }
}

impl Drop for BudgetShare {
    fn drop(&mut self) {
        self.budget.release_records(self.reserved);
    }
}
