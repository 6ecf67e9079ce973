//! Deterministic k-way merge of per-partition record runs.

use std::collections::VecDeque;

use tideline_core::Record;

use crate::page::SortDirection;

/// Merges per-partition runs into one sequence.
///
/// Each run must already be in scan order for `direction`. The merge always
/// takes the run head with the smallest (ascending) or largest (descending)
/// `(timestamp, partition, offset)` key. Only heads are compared, so a run's
/// own order is kept even when its timestamps are not monotonic.
///
/// Runs are consumed in key order, never in completion order, so equal
/// inputs give an equal output.
pub struct MergeIter {
    runs: Vec<VecDeque<Record>>,
    direction: SortDirection,
}

impl MergeIter {
    /// Creates a merge over `runs`.
    #[must_use]
    pub fn new(runs: Vec<Vec<Record>>, direction: SortDirection) -> Self {
        Self {
            runs: runs
                .into_iter()
                .filter(|run| !run.is_empty())
                .map(VecDeque::from)
                .collect(),
            direction,
        }
    }
}

impl Iterator for MergeIter {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let heads = self
            .runs
            .iter()
            .enumerate()
            .filter_map(|(idx, run)| run.front().map(|head| (head.sort_key(), idx)));

        let (_, idx) = match self.direction {
            SortDirection::Asc => heads.min()?,
            SortDirection::Desc => heads.max()?,
        };
        self.runs[idx].pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.runs.iter().map(VecDeque::len).sum();
        (len, Some(len))
    }
}
