//! Per-partition polling under a shared deadline and scan budget.
//!
//! A poller reads one partition in scan direction until one of:
//! - the log boundary of its scan range is reached (`Exhausted`, or `Empty`
//!   if nothing was there)
//! - its record target or its share of the scan budget is reached (`Filled`)
//! - the deadline passes (`Partial`)
//!
//! # Descending Scans
//!
//! Brokers only read forward, so a descending poller reads a window
//! `[max(lower, top + 1 - n), top]` forward and emits it reversed. A window
//! cut short by the deadline is thrown away; emitting its tail would leave a
//! gap below the records already returned.
//!
//! Deadline checks happen between reads. Every read is also bounded by the
//! remaining time, so a slow broker can't hold a poller past the deadline.

use std::sync::Arc;

use tideline_broker::{BrokerClient, BrokerError, ReadBatch, ReadRequest};
use tideline_core::{Offset, PartitionId, Record};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::budget::{BudgetShare, ScanBudget};
use crate::error::{BrowseError, BrowseResult};
use crate::page::SortDirection;
use crate::predicate::SearchPredicate;

/// Why a poller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing to read in the scan range.
    Empty,
    /// The scan range was read to its boundary.
    Exhausted,
    /// The record target or the shared budget was reached with data left.
    Filled,
    /// The deadline passed first.
    Partial,
}

impl PollStatus {
    /// Returns true if the poller has seen every record of its scan range.
    #[must_use]
    pub const fn reached_log_boundary(self) -> bool {
        matches!(self, Self::Empty | Self::Exhausted)
    }
}

/// What one poller should read.
#[derive(Debug, Clone, Copy)]
pub struct PollRequest {
    /// Partition to read.
    pub partition: PartitionId,
    /// First offset to examine.
    pub start: Offset,
    /// Lowest offset in scan range (inclusive).
    pub lower: Offset,
    /// End of the scan range (exclusive).
    pub upper: Offset,
    /// Scan direction.
    pub direction: SortDirection,
    /// Wall-clock deadline shared by every poller of the page.
    pub deadline: Instant,
    /// Matching records wanted before the poller may stop.
    pub target: u32,
    /// Budget records set aside for this poller alone.
    pub reserved_records: u64,
}

/// Records read by one poller, in scan order.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The partition.
    pub partition: PartitionId,
    /// Every record examined, matching or not, in scan order.
    pub records: Vec<Record>,
    /// Why the poller stopped.
    pub status: PollStatus,
    /// Offset of the last record examined.
    pub last_offset_seen: Option<Offset>,
}

/// Reads one partition for one page fetch.
pub struct PartitionPoller<B: BrokerClient + ?Sized> {
    broker: Arc<B>,
    topic: Arc<str>,
    predicate: Arc<SearchPredicate>,
    budget: Arc<ScanBudget>,
    max_records_per_read: u32,
    max_bytes_per_read: u64,
}

impl<B: BrokerClient + ?Sized> PartitionPoller<B> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(
        broker: Arc<B>,
        topic: Arc<str>,
        predicate: Arc<SearchPredicate>,
        budget: Arc<ScanBudget>,
        max_records_per_read: u32,
        max_bytes_per_read: u64,
    ) -> Self {
        Self {
            broker,
            topic,
            predicate,
            budget,
            max_records_per_read,
            max_bytes_per_read,
        }
    }

    /// Polls one partition.
    ///
    /// # Errors
    /// Returns `PartitionUnavailable` if a broker read fails. Running into the
    /// deadline is not an error.
    pub async fn poll(&self, request: PollRequest) -> BrowseResult<PollOutcome> {
        let mut records = Vec::new();
        let mut share = BudgetShare::new(Arc::clone(&self.budget), request.reserved_records);
        let status = match request.direction {
            SortDirection::Asc => {
                self.poll_ascending(&request, &mut share, &mut records)
                    .await?
            }
            SortDirection::Desc => {
                self.poll_descending(&request, &mut share, &mut records)
                    .await?
            }
        };
        let status = if status == PollStatus::Exhausted && records.is_empty() {
            PollStatus::Empty
        } else {
            status
        };

        debug!(
            topic = %self.topic,
            partition = %request.partition,
            start = %request.start,
            direction = ?request.direction,
            records = records.len(),
            status = ?status,
            "Poll finished"
        );

        Ok(PollOutcome {
            partition: request.partition,
            last_offset_seen: records.last().map(|r| r.offset),
            records,
            status,
        })
    }

    async fn poll_ascending(
        &self,
        request: &PollRequest,
        share: &mut BudgetShare,
        records: &mut Vec<Record>,
    ) -> BrowseResult<PollStatus> {
        let mut matched = 0u32;
        let mut offset = request.start;

        loop {
            if offset >= request.upper {
                return Ok(PollStatus::Exhausted);
            }
            if matched >= request.target {
                return Ok(PollStatus::Filled);
            }

            let range_left = request.upper.get() - offset.get();
            let wanted = self.records_wanted(request.target - matched).min(range_left);
            let granted = share.take(wanted);
            if granted == 0 {
                return Ok(PollStatus::Filled);
            }

            let Some(batch) = self
                .read_until(share, request.partition, offset, granted, request.deadline)
                .await?
            else {
                share.give_back(granted);
                return Ok(PollStatus::Partial);
            };

            let mut used = 0u64;
            // Records appended after the bounds snapshot are out of range.
            for record in batch.records {
                if record.offset >= request.upper {
                    break;
                }
                used += 1;
                if self.predicate.matches(&record) {
                    matched += 1;
                }
                records.push(record);
            }
            share.give_back(granted.saturating_sub(used));

            if batch.next_offset <= offset || batch.hit_log_end {
                return Ok(PollStatus::Exhausted);
            }
            offset = batch.next_offset;
        }
    }

    async fn poll_descending(
        &self,
        request: &PollRequest,
        share: &mut BudgetShare,
        records: &mut Vec<Record>,
    ) -> BrowseResult<PollStatus> {
        let mut matched = 0u32;
        let mut top = Some(request.start);

        loop {
            let Some(current) = top.filter(|t| *t >= request.lower) else {
                return Ok(PollStatus::Exhausted);
            };
            if matched >= request.target {
                return Ok(PollStatus::Filled);
            }

            let span = current.get() - request.lower.get() + 1;
            let wanted = self.records_wanted(request.target - matched).min(span);
            let granted = share.take(wanted);
            if granted == 0 {
                return Ok(PollStatus::Filled);
            }

            let window_start = Offset::new(current.get() + 1 - granted);
            let Some(window) = self
                .read_window(request, share, window_start, current)
                .await?
            else {
                share.give_back(granted);
                return Ok(PollStatus::Partial);
            };
            share.give_back(granted.saturating_sub(window.len() as u64));

            for record in window.into_iter().rev() {
                if self.predicate.matches(&record) {
                    matched += 1;
                }
                records.push(record);
            }
            top = window_start.prev();
        }
    }

    /// Reads `[from, to]` forward. `None` if the deadline cut it short.
    async fn read_window(
        &self,
        request: &PollRequest,
        share: &BudgetShare,
        from: Offset,
        to: Offset,
    ) -> BrowseResult<Option<Vec<Record>>> {
        let mut window = Vec::new();
        let mut offset = from;

        while offset <= to {
            let wanted = to.get() - offset.get() + 1;
            let Some(batch) = self
                .read_until(share, request.partition, offset, wanted, request.deadline)
                .await?
            else {
                return Ok(None);
            };

            window.extend(batch.records.into_iter().take_while(|r| r.offset <= to));
            if batch.next_offset <= offset || batch.hit_log_end {
                break;
            }
            offset = batch.next_offset;
        }
        Ok(Some(window))
    }

    /// Records to ask for when `missing` matches are still wanted.
    ///
    /// Without a filter every record counts, so the poller asks for exactly
    /// what's missing. With one, matches are unpredictable and it reads full
    /// batches.
    fn records_wanted(&self, missing: u32) -> u64 {
        if self.predicate.is_match_all() {
            u64::from(missing.min(self.max_records_per_read))
        } else {
            u64::from(self.max_records_per_read)
        }
    }

    /// One bounded read. `None` once the deadline has passed.
    async fn read_until(
        &self,
        share: &BudgetShare,
        partition: PartitionId,
        offset: Offset,
        max_records: u64,
        deadline: Instant,
    ) -> BrowseResult<Option<ReadBatch>> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        let request = ReadRequest {
            partition,
            offset,
            max_records: u32::try_from(max_records).unwrap_or(u32::MAX),
            max_bytes: self.max_bytes_per_read.min(share.remaining_bytes()),
            timeout: deadline - now,
        };

        match tokio::time::timeout_at(deadline, self.broker.read(&self.topic, request)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(batch)) => {
                let bytes: usize = batch.records.iter().map(Record::size).sum();
                share.charge_bytes(bytes as u64);
                Ok(Some(batch))
            }
            Ok(Err(BrokerError::Timeout { .. })) if Instant::now() >= deadline => Ok(None),
            Ok(Err(err)) => {
                warn!(
                    topic = %self.topic,
                    partition = %partition,
                    offset = %offset,
                    error = %err,
                    "Partition read failed"
                );
                Err(BrowseError::partition_unavailable(&self.topic, partition, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tideline_broker::{FaultConfig, MemoryBroker};
    use tideline_core::Timestamp;

    use super::*;

    const TOPIC: &str = "orders";

    async fn broker(count: u64) -> Arc<MemoryBroker> {
        let broker = MemoryBroker::new();
        broker.create_topic(TOPIC, 1).await;
        let records = (0..count)
            .map(|i| {
                Record::new(PartitionId::new(0), Offset::new(0), format!("msg-{i}"))
                    .with_timestamp(Timestamp::from_millis(i64::try_from(i).unwrap()))
            })
            .collect();
        broker
            .append(TOPIC, PartitionId::new(0), records)
            .await
            .unwrap();
        Arc::new(broker)
    }

    fn poller(
        broker: Arc<MemoryBroker>,
        predicate: SearchPredicate,
        budget: ScanBudget,
    ) -> PartitionPoller<MemoryBroker> {
        PartitionPoller::new(
            broker,
            Arc::from(TOPIC),
            Arc::new(predicate),
            Arc::new(budget),
            3,
            1024 * 1024,
        )
    }

    fn request(direction: SortDirection, start: u64, upper: u64, target: u32) -> PollRequest {
        PollRequest {
            partition: PartitionId::new(0),
            start: Offset::new(start),
            lower: Offset::new(0),
            upper: Offset::new(upper),
            direction,
            deadline: Instant::now() + Duration::from_secs(1),
            target,
            reserved_records: 0,
        }
    }

    fn offsets(outcome: &PollOutcome) -> Vec<u64> {
        outcome.records.iter().map(|r| r.offset.get()).collect()
    }

    #[tokio::test]
    async fn test_ascending_fills_target() {
        let poller = poller(broker(10).await, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Asc, 2, 10, 5)).await.unwrap();

        assert_eq!(offsets(&outcome), vec![2, 3, 4, 5, 6]);
        assert_eq!(outcome.status, PollStatus::Filled);
        assert_eq!(outcome.last_offset_seen, Some(Offset::new(6)));
    }

    #[tokio::test]
    async fn test_ascending_exhausts() {
        let poller = poller(broker(4).await, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Asc, 1, 4, 10)).await.unwrap();

        assert_eq!(offsets(&outcome), vec![1, 2, 3]);
        assert_eq!(outcome.status, PollStatus::Exhausted);
        assert!(outcome.status.reached_log_boundary());
    }

    #[tokio::test]
    async fn test_start_at_upper_is_empty() {
        let poller = poller(broker(4).await, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Asc, 4, 4, 10)).await.unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.status, PollStatus::Empty);
    }

    #[tokio::test]
    async fn test_descending_reads_windows_in_reverse() {
        let poller = poller(broker(10).await, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Desc, 9, 10, 5)).await.unwrap();

        assert_eq!(offsets(&outcome), vec![9, 8, 7, 6, 5]);
        assert_eq!(outcome.status, PollStatus::Filled);
    }

    #[tokio::test]
    async fn test_descending_stops_at_lower_bound() {
        let poller = poller(broker(10).await, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));
        let mut req = request(SortDirection::Desc, 4, 10, 50);
        req.lower = Offset::new(2);
        let outcome = poller.poll(req).await.unwrap();

        assert_eq!(offsets(&outcome), vec![4, 3, 2]);
        assert_eq!(outcome.status, PollStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_filter_counts_only_matches() {
        let predicate = SearchPredicate::parse("value=msg-7").unwrap();
        let poller = poller(broker(10).await, predicate, ScanBudget::new(100, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Asc, 0, 10, 1)).await.unwrap();

        // Reads full batches of 3 until offset 7 is seen.
        assert_eq!(offsets(&outcome), vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(outcome.status, PollStatus::Filled);
    }

    #[tokio::test]
    async fn test_shared_budget_stops_poller() {
        let poller = poller(broker(10).await, SearchPredicate::match_all(), ScanBudget::new(4, u64::MAX));
        let outcome = poller.poll(request(SortDirection::Asc, 0, 10, 10)).await.unwrap();

        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.status, PollStatus::Filled);
    }

    #[tokio::test]
    async fn test_broker_failure_is_partition_unavailable() {
        let broker = broker(5).await;
        broker
            .set_faults(FaultConfig::none().with_unavailable_partition(PartitionId::new(0)))
            .await;
        let poller = poller(broker, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));

        let err = poller
            .poll(request(SortDirection::Asc, 0, 5, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowseError::PartitionUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_partition_returns_partial() {
        let broker = broker(5).await;
        broker
            .set_faults(
                FaultConfig::none().with_read_latency(PartitionId::new(0), Duration::from_secs(5)),
            )
            .await;
        let poller = poller(broker, SearchPredicate::match_all(), ScanBudget::new(100, u64::MAX));

        let started = Instant::now();
        let outcome = poller.poll(request(SortDirection::Asc, 0, 5, 5)).await.unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.status, PollStatus::Partial);
        assert!(started.elapsed() <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_descending_window_cut_by_deadline_is_discarded() {
        let broker = broker(10).await;
        // Each read takes 400ms: the first window (3 reads of 1 record under a
        // tiny byte limit) cannot finish within one second.
        broker
            .set_faults(
                FaultConfig::none()
                    .with_read_latency(PartitionId::new(0), Duration::from_millis(400)),
            )
            .await;
        let poller = PartitionPoller::new(
            broker,
            Arc::from(TOPIC),
            Arc::new(SearchPredicate::match_all()),
            Arc::new(ScanBudget::new(100, u64::MAX)),
            3,
            1,
        );

        let outcome = poller.poll(request(SortDirection::Desc, 9, 10, 3)).await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.status, PollStatus::Partial);
    }

    #[tokio::test]
    async fn test_reserved_records_survive_a_drained_pool() {
        let budget = Arc::new(ScanBudget::new(0, u64::MAX));
        let poller = PartitionPoller::new(
            broker(10).await,
            Arc::from(TOPIC),
            Arc::new(SearchPredicate::match_all()),
            Arc::clone(&budget),
            3,
            1024 * 1024,
        );
        let mut req = request(SortDirection::Asc, 0, 10, 10);
        req.reserved_records = 2;
        let outcome = poller.poll(req).await.unwrap();

        assert_eq!(offsets(&outcome), vec![0, 1]);
        assert_eq!(outcome.status, PollStatus::Filled);
        assert_eq!(budget.remaining_records(), 0);
    }

    #[tokio::test]
    async fn test_unused_reservation_returns_to_pool() {
        let budget = Arc::new(ScanBudget::new(0, u64::MAX));
        let poller = PartitionPoller::new(
            broker(3).await,
            Arc::from(TOPIC),
            Arc::new(SearchPredicate::match_all()),
            Arc::clone(&budget),
            3,
            1024 * 1024,
        );
        let mut req = request(SortDirection::Asc, 0, 3, 10);
        req.reserved_records = 8;
        let outcome = poller.poll(req).await.unwrap();

        assert_eq!(outcome.status, PollStatus::Exhausted);
        assert_eq!(budget.remaining_records(), 5);
    }
}
