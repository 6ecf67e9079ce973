//! Browsing simulation tests.
//!
//! Each test derives a topic layout, page size, direction and filter from a
//! seed, browses the topic to the end on a paused clock and checks the
//! session properties. Failing seeds are printed so they can be replayed.
//!
//! # Test Categories
//!
//! 1. **Clean Sessions**: no faults; every record once, in order
//! 2. **Read Failures**: injected broker failures, page fetches retried
//! 3. **Slow Partitions**: read latency produces partial pages
//! 4. **Tight Budgets**: scan budgets smaller than partitions x page size

// Test-specific lint allowances - these are less critical in test code.
#![allow(clippy::cast_possible_truncation)] // u64 to usize safe on 64-bit test machines
#![allow(clippy::too_many_lines)] // Test functions can be longer for clarity
#![allow(clippy::unreadable_literal)] // Large seed numbers are fine without separators
#![allow(clippy::doc_markdown)] // Backticks in docs not critical for tests
#![allow(clippy::uninlined_format_args)] // Format string style not critical for tests

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tideline_broker::{FaultConfig, MemoryBroker};
use tideline_browser::{
    BrowserConfig, PageOptions, RecordBrowser, SearchPredicate, SortDirection,
};
use tideline_core::{PartitionId, Record};

use crate::properties::{check_exactly_once, check_page_bounds, check_sorted};
use crate::scenarios::{browse_to_end, seed_topic, seeds, TimestampPattern, VALUE_WORDS};

const TOPIC: &str = "sim";
const MAX_PAGES: usize = 2_000;

/// A browsing session derived from a seed.
#[derive(Debug)]
struct SimCase {
    counts: Vec<u64>,
    page_size: u32,
    sort: SortDirection,
    search: Option<&'static str>,
}

impl SimCase {
    fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let partitions = rng.gen_range(1..=6);
        let counts = (0..partitions)
            .map(|_| {
                // Roughly one partition in five is empty.
                if rng.gen_bool(0.2) {
                    0
                } else {
                    rng.gen_range(1..=60)
                }
            })
            .collect();
        let sort = if rng.gen_bool(0.5) {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        let search = if rng.gen_bool(0.3) {
            Some(VALUE_WORDS[rng.gen_range(0..VALUE_WORDS.len())])
        } else {
            None
        };
        Self {
            counts,
            page_size: rng.gen_range(1..=20),
            sort,
            search,
        }
    }

    fn options(&self) -> PageOptions {
        let options = PageOptions::new()
            .with_page_size(self.page_size)
            .with_sort(self.sort);
        match self.search {
            Some(word) => options.with_search(SearchPredicate::contains(word)),
            None => options,
        }
    }

    fn expected(&self, stored: &[Record]) -> Vec<Record> {
        let predicate = self.options().search;
        stored
            .iter()
            .filter(|record| predicate.matches(record))
            .cloned()
            .collect()
    }
}

fn all_seeds() -> impl Iterator<Item = u64> {
    seeds::REGRESSION_SEEDS
        .iter()
        .copied()
        .chain((0..seeds::RANDOM_SEED_COUNT).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

// ============================================================================
// DST Test 1: Clean Sessions
// ============================================================================

/// Without faults every session returns each matching record exactly once,
/// sorted, in pages no larger than the page size.
#[tokio::test(start_paused = true)]
async fn test_dst_browse_clean_sessions() {
    for seed in all_seeds() {
        let case = SimCase::from_seed(seed);
        let broker = MemoryBroker::new();
        let stored = seed_topic(&broker, TOPIC, &case.counts, TimestampPattern::Seeded(seed))
            .await
            .unwrap();
        let browser = RecordBrowser::new(Arc::new(broker), BrowserConfig::for_testing()).unwrap();

        let run = browse_to_end(&browser, TOPIC, case.options(), MAX_PAGES, 0)
            .await
            .unwrap_or_else(|err| panic!("seed {seed} {case:?}: {err}"));

        assert!(!run.any_partial(), "seed {seed}: unexpected partial page");
        let violations = check_exactly_once(&run.records, &case.expected(&stored));
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
        let violations = check_sorted(&run.records, case.sort);
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
        let violations = check_page_bounds(&run, case.page_size);
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
    }
}

/// Sessions are deterministic: the same seed gives the same pages.
#[tokio::test(start_paused = true)]
async fn test_dst_browse_replay_is_identical() {
    for &seed in seeds::REGRESSION_SEEDS {
        let case = SimCase::from_seed(seed);
        let mut runs = Vec::new();
        for _ in 0..2 {
            let broker = MemoryBroker::new();
            seed_topic(&broker, TOPIC, &case.counts, TimestampPattern::Seeded(seed))
                .await
                .unwrap();
            let browser =
                RecordBrowser::new(Arc::new(broker), BrowserConfig::for_testing()).unwrap();
            runs.push(
                browse_to_end(&browser, TOPIC, case.options(), MAX_PAGES, 0)
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(runs[0].records, runs[1].records, "seed {seed}");
        assert_eq!(runs[0].pages, runs[1].pages, "seed {seed}");
    }
}

// ============================================================================
// DST Test 2: Read Failures
// ============================================================================

/// A failed page fetch leaves no trace: retrying it with the same token
/// yields a session identical in content to a clean one.
#[tokio::test(start_paused = true)]
async fn test_dst_browse_with_read_failures() {
    let mut total_retries = 0;

    for seed in all_seeds() {
        let case = SimCase::from_seed(seed);
        let broker = MemoryBroker::with_faults(seed, FaultConfig::none().with_read_fail_rate(0.05));
        let stored = seed_topic(&broker, TOPIC, &case.counts, TimestampPattern::Seeded(seed))
            .await
            .unwrap();
        // One read per partition per page, so a retried page can avoid
        // the next injected failure.
        let config = BrowserConfig::for_testing().with_read_limits(64, 64 * 1024);
        let browser = RecordBrowser::new(Arc::new(broker), config).unwrap();

        let run = browse_to_end(&browser, TOPIC, case.options(), MAX_PAGES, 500)
            .await
            .unwrap_or_else(|err| panic!("seed {seed} {case:?}: {err}"));
        total_retries += run.retries;

        let violations = check_exactly_once(&run.records, &case.expected(&stored));
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
        let violations = check_sorted(&run.records, case.sort);
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
    }

    assert!(total_retries > 0, "fault injection never fired");
}

// ============================================================================
// DST Test 3: Slow Partitions
// ============================================================================

/// Reads slower than a fraction of the poll timeout cut pages short. The
/// session still returns every record exactly once.
#[tokio::test(start_paused = true)]
async fn test_dst_browse_with_slow_partitions() {
    let mut partial_pages = 0;

    for seed in all_seeds() {
        let case = SimCase::from_seed(seed);
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED);

        let mut faults = FaultConfig::none();
        for p in 0..case.counts.len() as u64 {
            if rng.gen_bool(0.5) {
                let latency = Duration::from_millis(rng.gen_range(20..=150));
                faults = faults.with_read_latency(PartitionId::new(p), latency);
            }
        }

        let broker = MemoryBroker::with_faults(seed, faults);
        let stored = seed_topic(&broker, TOPIC, &case.counts, TimestampPattern::Seeded(seed))
            .await
            .unwrap();
        let browser = RecordBrowser::new(Arc::new(broker), BrowserConfig::for_testing()).unwrap();

        let run = browse_to_end(&browser, TOPIC, case.options(), MAX_PAGES, 0)
            .await
            .unwrap_or_else(|err| panic!("seed {seed} {case:?}: {err}"));
        partial_pages += run.pages.iter().filter(|page| page.partial).count();

        let violations = check_exactly_once(&run.records, &case.expected(&stored));
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
        let violations = check_page_bounds(&run, case.page_size);
        assert!(violations.is_empty(), "seed {seed} {case:?}: {violations:?}");
    }

    assert!(partial_pages > 0, "latency never produced a partial page");
}

// ============================================================================
// DST Test 4: Tight Budgets
// ============================================================================

/// A scan budget too small to poll a full page from every partition still
/// gives a sorted session with every record exactly once.
#[tokio::test(start_paused = true)]
async fn test_dst_browse_with_tight_budgets() {
    for seed in all_seeds() {
        let case = SimCase::from_seed(seed);
        let mut rng = StdRng::seed_from_u64(seed ^ 0xB0D6E7);
        let budget = u64::from(case.page_size) + rng.gen_range(0..=u64::from(case.page_size));

        let broker = MemoryBroker::new();
        let stored = seed_topic(&broker, TOPIC, &case.counts, TimestampPattern::Seeded(seed))
            .await
            .unwrap();
        let config = BrowserConfig::for_testing()
            .with_page_sizes(1, case.page_size, case.page_size)
            .with_scan_budget(budget, 1024 * 1024);
        let browser = RecordBrowser::new(Arc::new(broker), config).unwrap();

        let run = browse_to_end(&browser, TOPIC, case.options(), MAX_PAGES, 0)
            .await
            .unwrap_or_else(|err| panic!("seed {seed} budget {budget} {case:?}: {err}"));

        let violations = check_exactly_once(&run.records, &case.expected(&stored));
        assert!(violations.is_empty(), "seed {seed} budget {budget} {case:?}: {violations:?}");
        let violations = check_sorted(&run.records, case.sort);
        assert!(violations.is_empty(), "seed {seed} budget {budget} {case:?}: {violations:?}");
        let violations = check_page_bounds(&run, case.page_size);
        assert!(violations.is_empty(), "seed {seed} budget {budget} {case:?}: {violations:?}");
    }
}
