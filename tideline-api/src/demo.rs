//! Demo data for the CLI.

use tideline_broker::{BrokerResult, MemoryBroker};
use tideline_core::{Offset, PartitionId, Record, Timestamp};

/// Timestamp of the first demo record (2024-01-01T00:00:00Z).
const DEMO_EPOCH_MS: i64 = 1_704_067_200_000;

const STATUSES: [&str; 4] = ["created", "paid", "shipped", "FAILED"];

/// Creates `topic` with `partitions` partitions of `per_partition` order
/// events each.
///
/// Record `i` of partition `p` has key `order-{i}` and is stamped one second
/// after record `i - 1`, offset by `p` milliseconds, so partitions interleave
/// deterministically.
///
/// # Errors
/// Returns an error if appending fails.
pub async fn seed_demo_topic(
    broker: &MemoryBroker,
    topic: &str,
    partitions: u32,
    per_partition: u32,
) -> BrokerResult<()> {
    broker.create_topic(topic, partitions).await;

    for p in 0..partitions {
        let partition = PartitionId::new(u64::from(p));
        let records = (0..per_partition)
            .map(|i| {
                let status = STATUSES[i as usize % STATUSES.len()];
                let ts = DEMO_EPOCH_MS + i64::from(i) * 1_000 + i64::from(p);
                Record::new(
                    partition,
                    Offset::earliest(),
                    format!(r#"{{"order":{i},"status":"{status}"}}"#),
                )
                .with_key(format!("order-{i}"))
                .with_timestamp(Timestamp::from_millis(ts))
                .with_header("source", "checkout")
            })
            .collect();
        broker.append(topic, partition, records).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tideline_broker::BrokerClient;

    use super::*;

    #[tokio::test]
    async fn test_seed_demo_topic() {
        let broker = MemoryBroker::new();
        seed_demo_topic(&broker, "orders", 3, 4).await.unwrap();

        let partitions = broker.list_partitions("orders").await.unwrap();
        assert_eq!(partitions.len(), 3);
        for partition in partitions {
            let bounds = broker.offset_bounds("orders", partition).await.unwrap();
            assert_eq!(bounds.record_count(), 4);
        }
    }
}
