//! Tideline topic browser CLI.
//!
//! Seeds an in-memory topic with demo order events and browses it page by
//! page through the `topic/data` service, following the continuation token.
//! Each response is printed to stdout as JSON; logs go to stderr.
//!
//! ```bash
//! tideline --partitions 3 --records 40 --page-size 10 --pages 2
//! tideline --sort newest --search 'value~failed'
//! tideline --timestamp 2024-01-01T00:00:10Z --partition 1
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tideline_api::{
    seed_demo_topic, SortOrder, TimestampParam, TopicDataRequest, TopicDataService,
};
use tideline_broker::MemoryBroker;
use tideline_browser::{BrowserConfig, RecordBrowser};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Cluster id the seeded broker is registered under.
const LOCAL_CLUSTER: &str = "local";

/// Browse a seeded in-memory topic.
#[derive(Parser, Debug)]
#[command(name = "tideline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topic to seed and browse.
    #[arg(long, default_value = "orders")]
    topic: String,

    /// Number of partitions to seed.
    #[arg(long, default_value = "3")]
    partitions: u32,

    /// Records to seed per partition.
    #[arg(long, default_value = "25")]
    records: u32,

    /// Sort order.
    #[arg(long, value_enum, default_value = "oldest")]
    sort: SortOrder,

    /// Restrict browsing to one partition.
    #[arg(long)]
    partition: Option<u64>,

    /// Only records at or after this time (RFC 3339 or epoch millis).
    #[arg(long)]
    timestamp: Option<String>,

    /// Search expression, e.g. `key=order-3` or `value~failed`.
    #[arg(long)]
    search: Option<String>,

    /// Records per page.
    #[arg(long)]
    page_size: Option<u32>,

    /// Maximum number of pages to fetch.
    #[arg(long, default_value = "3")]
    pages: u32,

    /// Time a page fetch may spend polling, in milliseconds.
    #[arg(long, default_value = "1000")]
    poll_timeout_ms: u64,

    /// Key authenticating continuation tokens.
    #[arg(long)]
    cursor_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config =
        BrowserConfig::default().with_poll_timeout(Duration::from_millis(args.poll_timeout_ms));
    if let Some(secret) = &args.cursor_secret {
        config = config.with_cursor_secret(secret.as_bytes());
    } else {
        warn!("No cursor secret configured, using the built-in default");
    }

    let broker = MemoryBroker::new();
    seed_demo_topic(&broker, &args.topic, args.partitions, args.records).await?;
    info!(
        topic = %args.topic,
        partitions = args.partitions,
        records_per_partition = args.records,
        "Seeded demo topic"
    );

    let mut service = TopicDataService::new();
    service.register(LOCAL_CLUSTER, RecordBrowser::new(Arc::new(broker), config)?);

    let mut request = TopicDataRequest {
        sort: args.sort,
        partition: args.partition,
        timestamp: args.timestamp.map(TimestampParam::Text),
        search: args.search,
        page_size: args.page_size,
        ..TopicDataRequest::new(LOCAL_CLUSTER, args.topic)
    };

    for _ in 0..args.pages {
        let response = match service.fetch(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(status = err.status_code(), error = %err, "Page fetch failed");
                return Err(err.into());
            }
        };

        info!(
            page = response.page,
            records = response.results.len(),
            partial = response.partial,
            has_next = response.after.is_some(),
            "Fetched page"
        );
        println!("{}", serde_json::to_string_pretty(&response)?);

        match request.next_page(&response) {
            Some(next) => request = next,
            None => {
                info!("Reached the end of the topic");
                break;
            }
        }
    }

    Ok(())
}
