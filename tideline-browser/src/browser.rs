//! Page fetch orchestration.
//!
//! A page fetch runs in three phases:
//!
//! 1. **Plan**: resolve the partition scope, verify the cursor and look up
//!    the scan range of every partition with data left (concurrently).
//! 2. **Poll**: one [`PartitionPoller`] task per partition, all sharing one
//!    deadline and one [`ScanBudget`]. Each poller has a share of the budget
//!    set aside for it before any poller starts.
//! 3. **Assemble**: merge the runs, filter, cut at the page size and derive
//!    each partition's next offset from what the page consumed.
//!
//! A partition that stopped `Filled` still has records nobody has read. The
//! merge never goes past the last record polled from such a partition, so no
//! record on the page can sort after one left unread.
//!
//! Nothing is kept between pages. Dropping the `fetch_page` future drops the
//! task sets and aborts every task still running.

use std::collections::BTreeMap;
use std::sync::Arc;

use tideline_broker::{BrokerClient, BrokerError};
use tideline_core::{Offset, PartitionId, Record, Timestamp};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::budget::{fair_share, ScanBudget};
use crate::config::{BrowserConfig, ConfigError};
use crate::cursor::{CursorCodec, CursorScope, PageCursor, PartitionCursor};
use crate::error::{BrowseError, BrowseResult};
use crate::merge::MergeIter;
use crate::page::{Continuation, Page, PageOptions, SortDirection};
use crate::poller::{PartitionPoller, PollOutcome, PollRequest, PollStatus};
use crate::predicate::SearchPredicate;

type SortKey = (Timestamp, PartitionId, Offset);

/// Offsets one poller covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScanRange {
    partition: PartitionId,
    start: Offset,
    lower: Offset,
    upper: Offset,
}

impl ScanRange {
    const fn record_count(&self, direction: SortDirection) -> u64 {
        match direction {
            SortDirection::Asc => self.upper.get().saturating_sub(self.start.get()),
            SortDirection::Desc => (self.start.get() + 1).saturating_sub(self.lower.get()),
        }
    }
}

/// What the page did with one partition's polled records.
#[derive(Debug)]
struct Progress {
    start: Offset,
    status: PollStatus,
    polled: usize,
    consumed: usize,
    last_consumed: Option<Offset>,
}

/// Browses topic records page by page.
pub struct RecordBrowser<B: BrokerClient + ?Sized> {
    broker: Arc<B>,
    config: BrowserConfig,
    codec: CursorCodec,
}

impl<B: BrokerClient + ?Sized> RecordBrowser<B> {
    /// Creates a browser over `broker`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(broker: Arc<B>, config: BrowserConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = CursorCodec::new(&config.cursor_secret)?;
        Ok(Self {
            broker,
            config,
            codec,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Fetches one page of `topic`.
    ///
    /// Without a cursor this is the first page. With one, the page continues
    /// where the page that issued it stopped.
    ///
    /// # Errors
    /// - `TopicNotFound` if the broker doesn't know the topic
    /// - `InvalidOptions` for an out-of-range page size, an unknown partition
    ///   filter, or options that contradict the cursor
    /// - `InvalidCursor` if the token is malformed or belongs to another
    ///   topic or partition set
    /// - `PartitionUnavailable` if a partition can't report offsets or be read
    pub async fn fetch_page(&self, topic: &str, options: PageOptions) -> BrowseResult<Page> {
        let page_size = self.config.resolve_page_size(options.page_size)?;
        let scope = self.resolve_scope(topic, options.partition).await?;

        let resume = match options.cursor.as_deref() {
            Some(token) => Some(self.resume_cursor(token, &scope, &options)?),
            None => None,
        };

        let direction = options.sort;
        let page_index = resume.as_ref().map_or(1, |cursor| cursor.page_index);
        let timestamp_bound = resume
            .as_ref()
            .map_or(options.timestamp_lower_bound, |cursor| cursor.timestamp_lower_bound);

        let active: Vec<(PartitionId, Option<Offset>)> = match &resume {
            Some(cursor) => cursor
                .partitions
                .iter()
                .map(|entry| (entry.partition, Some(entry.next_offset)))
                .collect(),
            None => scope.partitions().iter().map(|p| (*p, None)).collect(),
        };

        let topic_name: Arc<str> = Arc::from(topic);
        let ranges = self
            .plan_ranges(&topic_name, &active, direction, timestamp_bound)
            .await?;
        let remaining_estimate: u64 = ranges.iter().map(|r| r.record_count(direction)).sum();

        let predicate = Arc::new(options.search);
        let outcomes = self
            .poll_ranges(&topic_name, &ranges, direction, &predicate, page_size)
            .await?;

        let partial = outcomes.iter().any(|o| o.status == PollStatus::Partial);
        let (records, progress) = assemble(outcomes, &ranges, direction, &predicate, page_size);

        let next_partitions = next_cursor_entries(&progress, direction);
        let next = if next_partitions.is_empty() {
            None
        } else {
            let cursor = PageCursor {
                partitions: next_partitions,
                direction,
                page_index: page_index.saturating_add(1),
                timestamp_lower_bound: timestamp_bound,
            };
            let token = self.codec.encode(&scope, &cursor);
            Some(Continuation { cursor, token })
        };

        debug!(
            topic = %topic,
            page = page_index,
            records = records.len(),
            polled_partitions = ranges.len(),
            partial,
            exhausted = next.is_none(),
            "Fetched page"
        );

        Ok(Page {
            records,
            next,
            partial,
            page_number: page_index,
            remaining_estimate,
        })
    }

    /// Resolves the partitions a session covers.
    async fn resolve_scope(
        &self,
        topic: &str,
        filter: Option<PartitionId>,
    ) -> BrowseResult<CursorScope> {
        let partitions = self
            .broker
            .list_partitions(topic)
            .await
            .map_err(|err| match err {
                BrokerError::TopicNotFound { topic } => BrowseError::TopicNotFound { topic },
                source => {
                    warn!(topic = %topic, error = %source, "Listing partitions failed");
                    BrowseError::MetadataUnavailable {
                        topic: topic.to_string(),
                        source,
                    }
                }
            })?;

        let partitions = match filter {
            Some(partition) if partitions.contains(&partition) => vec![partition],
            Some(partition) => {
                return Err(BrowseError::invalid_options(format!(
                    "{partition} is not a partition of topic {topic}"
                )))
            }
            None => partitions,
        };
        Ok(CursorScope::new(topic, partitions))
    }

    /// Decodes a cursor and checks it against the request options.
    fn resume_cursor(
        &self,
        token: &str,
        scope: &CursorScope,
        options: &PageOptions,
    ) -> BrowseResult<PageCursor> {
        let cursor = self.codec.decode(token, scope).map_err(|err| {
            warn!(topic = %scope.topic(), error = %err, "Rejected cursor");
            err
        })?;

        if cursor.direction != options.sort {
            return Err(BrowseError::invalid_options(
                "sort order differs from the one the cursor was issued for",
            ));
        }
        if let Some(bound) = options.timestamp_lower_bound {
            if cursor.timestamp_lower_bound != Some(bound) {
                return Err(BrowseError::invalid_options(
                    "timestamp bound differs from the one the cursor was issued for",
                ));
            }
        }
        if let Some(hint) = options.page_number {
            if hint != cursor.page_index {
                debug!(
                    topic = %scope.topic(),
                    hint,
                    page = cursor.page_index,
                    "Ignoring page number that disagrees with cursor"
                );
            }
        }
        Ok(cursor)
    }

    /// Looks up the scan range of every active partition concurrently.
    async fn plan_ranges(
        &self,
        topic: &Arc<str>,
        active: &[(PartitionId, Option<Offset>)],
        direction: SortDirection,
        timestamp_bound: Option<Timestamp>,
    ) -> BrowseResult<Vec<ScanRange>> {
        let mut tasks = JoinSet::new();
        for &(partition, resume) in active {
            let broker = Arc::clone(&self.broker);
            let topic = Arc::clone(topic);
            tasks.spawn(async move {
                plan_partition(&*broker, &topic, partition, resume, direction, timestamp_bound)
                    .await
            });
        }

        let mut ranges = Vec::with_capacity(active.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(range))) => ranges.push(range),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(BrowseError::Internal {
                        message: format!("offset lookup task failed: {join_err}"),
                    });
                }
            }
        }
        ranges.sort_by_key(|range| range.partition);
        Ok(ranges)
    }

    /// Runs one poller per range under a shared deadline and budget.
    async fn poll_ranges(
        &self,
        topic: &Arc<str>,
        ranges: &[ScanRange],
        direction: SortDirection,
        predicate: &Arc<SearchPredicate>,
        page_size: u32,
    ) -> BrowseResult<Vec<PollOutcome>> {
        let deadline = Instant::now() + self.config.poll_timeout;
        let total = self.config.scan_records_max;
        let reserved = fair_share(total, ranges.len(), u64::from(page_size));
        let pool = total.saturating_sub(reserved.saturating_mul(ranges.len() as u64));
        let budget = Arc::new(ScanBudget::new(pool, self.config.scan_bytes_max));

        let mut tasks = JoinSet::new();
        for range in ranges {
            let poller = PartitionPoller::new(
                Arc::clone(&self.broker),
                Arc::clone(topic),
                Arc::clone(predicate),
                Arc::clone(&budget),
                self.config.max_records_per_read,
                self.config.max_bytes_per_read,
            );
            let request = PollRequest {
                partition: range.partition,
                start: range.start,
                lower: range.lower,
                upper: range.upper,
                direction,
                deadline,
                target: page_size,
                reserved_records: reserved,
            };
            tasks.spawn(async move { poller.poll(request).await });
        }

        let mut outcomes = Vec::with_capacity(ranges.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(err)) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(BrowseError::Internal {
                        message: format!("poller task failed: {join_err}"),
                    });
                }
            }
        }
        // Completion order must not leak into the page.
        outcomes.sort_by_key(|outcome| outcome.partition);
        Ok(outcomes)
    }
}

/// Computes where a partition's scan starts and stops. `None` if there is
/// nothing to read.
async fn plan_partition<B: BrokerClient + ?Sized>(
    broker: &B,
    topic: &str,
    partition: PartitionId,
    resume: Option<Offset>,
    direction: SortDirection,
    timestamp_bound: Option<Timestamp>,
) -> BrowseResult<Option<ScanRange>> {
    let unavailable = |err| BrowseError::partition_unavailable(topic, partition, err);

    let bounds = broker
        .offset_bounds(topic, partition)
        .await
        .map_err(unavailable)?;

    // First offset at or after the timestamp bound; the log end if none.
    let timestamp_floor = match timestamp_bound {
        Some(ts) => Some(
            broker
                .offset_for_timestamp(topic, partition, ts)
                .await
                .map_err(unavailable)?
                .unwrap_or(bounds.latest)
                .max(bounds.earliest),
        ),
        None => None,
    };

    let range = match direction {
        SortDirection::Asc => {
            // Offsets lost to retention are skipped.
            let start = match resume {
                Some(offset) => offset.max(bounds.earliest),
                None => timestamp_floor.unwrap_or(bounds.earliest),
            };
            (start < bounds.latest).then_some(ScanRange {
                partition,
                start,
                lower: bounds.earliest,
                upper: bounds.latest,
            })
        }
        SortDirection::Desc => {
            let lower = timestamp_floor.unwrap_or(bounds.earliest);
            bounds
                .latest
                .prev()
                .map(|top| resume.map_or(top, |offset| offset.min(top)))
                .filter(|start| *start >= lower)
                .map(|start| ScanRange {
                    partition,
                    start,
                    lower,
                    upper: bounds.latest,
                })
        }
    };
    Ok(range)
}

/// Merges, filters and cuts the page, tracking what each partition consumed.
fn assemble(
    outcomes: Vec<PollOutcome>,
    ranges: &[ScanRange],
    direction: SortDirection,
    predicate: &SearchPredicate,
    page_size: u32,
) -> (Vec<Record>, BTreeMap<PartitionId, Progress>) {
    let mut progress: BTreeMap<PartitionId, Progress> = BTreeMap::new();
    let mut runs = Vec::with_capacity(outcomes.len());
    let frontier = merge_frontier(&outcomes, direction);

    for outcome in outcomes {
        let start = ranges
            .iter()
            .find(|range| range.partition == outcome.partition)
            .map_or(Offset::earliest(), |range| range.start);
        progress.insert(
            outcome.partition,
            Progress {
                start,
                status: outcome.status,
                polled: outcome.records.len(),
                consumed: 0,
                last_consumed: None,
            },
        );
        runs.push(outcome.records);
    }

    let page_size = page_size as usize;
    let mut records = Vec::with_capacity(page_size);
    for record in MergeIter::new(runs, direction) {
        if records.len() >= page_size {
            break;
        }
        if frontier.is_some_and(|limit| is_past(record.sort_key(), limit, direction)) {
            break;
        }
        if let Some(entry) = progress.get_mut(&record.partition) {
            entry.consumed += 1;
            entry.last_consumed = Some(record.offset);
        }
        if predicate.matches(&record) {
            records.push(record);
        }
    }
    (records, progress)
}

/// The furthest key the merge may emit: the nearest last-polled key among
/// partitions that stopped `Filled`. `None` if no partition limits the page.
fn merge_frontier(outcomes: &[PollOutcome], direction: SortDirection) -> Option<SortKey> {
    let limits = outcomes
        .iter()
        .filter(|outcome| outcome.status == PollStatus::Filled)
        .filter_map(|outcome| outcome.records.last().map(Record::sort_key));
    match direction {
        SortDirection::Asc => limits.min(),
        SortDirection::Desc => limits.max(),
    }
}

/// Returns true if `key` comes after `limit` in scan order.
fn is_past(key: SortKey, limit: SortKey, direction: SortDirection) -> bool {
    match direction {
        SortDirection::Asc => key > limit,
        SortDirection::Desc => key < limit,
    }
}

/// Derives the next cursor entries. Partitions that were read to their
/// boundary and fully consumed are dropped.
fn next_cursor_entries(
    progress: &BTreeMap<PartitionId, Progress>,
    direction: SortDirection,
) -> Vec<PartitionCursor> {
    progress
        .iter()
        .filter(|(_, p)| !(p.status.reached_log_boundary() && p.consumed == p.polled))
        .filter_map(|(partition, p)| {
            let next_offset = match (p.last_consumed, direction) {
                (None, _) => Some(p.start),
                (Some(offset), SortDirection::Asc) => Some(offset.next()),
                (Some(offset), SortDirection::Desc) => offset.prev(),
            };
            next_offset.map(|offset| PartitionCursor::new(*partition, offset))
        })
        .collect()
}
