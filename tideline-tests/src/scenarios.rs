//! Reusable test scenarios for browsing tests.
//!
//! Scenarios define topic layouts, timestamp patterns and a driver that
//! follows continuation tokens until a session is exhausted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tideline_broker::{BrokerClient, BrokerError, MemoryBroker};
use tideline_browser::{BrowseError, BrowseResult, PageOptions, RecordBrowser};
use tideline_core::{Offset, PartitionId, Record, Timestamp};

/// Standard topic layouts: record count per partition.
pub mod layouts {
    /// Two partitions of uneven length.
    pub const TWO_UNEVEN: &[u64] = &[5, 3];

    /// One long partition, some short and one empty.
    pub const SKEWED: &[u64] = &[40, 1, 0, 12];

    /// Mostly empty partitions.
    pub const SPARSE: &[u64] = &[0, 0, 7, 0];

    /// A single partition.
    pub const SINGLE: &[u64] = &[25];

    /// Many small partitions.
    pub const WIDE: &[u64] = &[3, 3, 3, 3, 3, 3, 3, 3];

    /// Several partitions of equal length.
    pub const EVEN: &[u64] = &[10, 10, 10, 10];
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to run in addition to the regression seeds.
    pub const RANDOM_SEED_COUNT: u64 = 40;
}

/// Words the seeded record values are made of.
pub const VALUE_WORDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

/// How timestamps are assigned to seeded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPattern {
    /// Record `i` of partition `p` at `i * 10 + p`: partitions interleave.
    Interleaved,
    /// Every record has the same timestamp; order falls back to
    /// partition and offset.
    Identical,
    /// Non-decreasing per partition with random steps, ties included.
    Seeded(u64),
}

/// Seeds `topic` with `counts[p]` records in partition `p`.
///
/// Returns the records as stored, with partition and offset assigned.
///
/// # Errors
/// Returns an error if appending fails.
pub async fn seed_topic(
    broker: &MemoryBroker,
    topic: &str,
    counts: &[u64],
    pattern: TimestampPattern,
) -> Result<Vec<Record>, BrokerError> {
    #[allow(clippy::cast_possible_truncation)] // Layouts are small.
    broker.create_topic(topic, counts.len() as u32).await;

    let mut stored = Vec::new();
    for (p, &count) in (0u64..).zip(counts) {
        let partition = PartitionId::new(p);
        let mut rng = match pattern {
            TimestampPattern::Seeded(seed) => Some(StdRng::seed_from_u64(seed.wrapping_add(p))),
            _ => None,
        };
        let mut ts = rng.as_mut().map_or(0, |rng| rng.gen_range(0..100));

        let records: Vec<Record> = (0..count)
            .map(|i| {
                ts = match (pattern, rng.as_mut()) {
                    (TimestampPattern::Interleaved, _) => to_millis(i * 10 + p),
                    (TimestampPattern::Identical, _) => 1_000,
                    (TimestampPattern::Seeded(_), Some(rng)) if i > 0 => ts + rng.gen_range(0..=20),
                    (TimestampPattern::Seeded(_), _) => ts,
                };
                let word = VALUE_WORDS[(i % VALUE_WORDS.len() as u64) as usize];
                Record::new(partition, Offset::new(i), format!("{word} p{p} r{i}"))
                    .with_key(format!("key-{}", i % 10))
                    .with_header("parity", if i % 2 == 0 { "even" } else { "odd" })
                    .with_timestamp(Timestamp::from_millis(ts))
            })
            .collect();

        broker.append(topic, partition, records.clone()).await?;
        stored.extend(records);
    }
    Ok(stored)
}

fn to_millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// One page of a browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    /// Page number reported by the browser.
    pub page_number: u32,
    /// Records on the page.
    pub len: usize,
    /// Whether the page was cut short by the deadline.
    pub partial: bool,
}

/// Outcome of browsing a topic to the end.
#[derive(Debug, Clone, Default)]
pub struct BrowseRun {
    /// Every record returned, in page order.
    pub records: Vec<Record>,
    /// Per-page summaries.
    pub pages: Vec<PageSummary>,
    /// Page fetches that failed and were retried.
    pub retries: usize,
}

impl BrowseRun {
    /// Returns true if any page was partial.
    #[must_use]
    pub fn any_partial(&self) -> bool {
        self.pages.iter().any(|page| page.partial)
    }
}

/// Follows continuation tokens from the first page until the session is
/// exhausted.
///
/// A page that fails with `PartitionUnavailable` is fetched again with the
/// same token, up to `max_retries` times in a row.
///
/// # Errors
/// Returns the first non-retryable error, the last error once retries are
/// spent, or `Internal` if the session doesn't end within `max_pages`.
pub async fn browse_to_end<B: BrokerClient + ?Sized>(
    browser: &RecordBrowser<B>,
    topic: &str,
    options: PageOptions,
    max_pages: usize,
    max_retries: usize,
) -> BrowseResult<BrowseRun> {
    let mut run = BrowseRun::default();
    let mut token: Option<String> = None;

    while run.pages.len() < max_pages {
        let mut page_options = options.clone();
        page_options.cursor.clone_from(&token);

        let mut attempts = 0;
        let page = loop {
            match browser.fetch_page(topic, page_options.clone()).await {
                Ok(page) => break page,
                Err(BrowseError::PartitionUnavailable { .. }) if attempts < max_retries => {
                    attempts += 1;
                    run.retries += 1;
                }
                Err(err) => return Err(err),
            }
        };

        run.pages.push(PageSummary {
            page_number: page.page_number,
            len: page.records.len(),
            partial: page.partial,
        });
        token = page.next_token().map(str::to_string);
        run.records.extend(page.records);

        if token.is_none() {
            return Ok(run);
        }
    }

    Err(BrowseError::Internal {
        message: format!("session did not end within {max_pages} pages"),
    })
}
