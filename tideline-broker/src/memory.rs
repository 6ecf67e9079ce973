//! In-memory broker with deterministic fault injection.
//!
//! Each topic is a set of partition logs held in memory. A partition log is a
//! dense run of records starting at its log start offset; retention moves the
//! start offset forward and drops the records below it.
//!
//! Faults are injected deterministically from a seed and an operation counter
//! so a failing test can be replayed exactly.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tideline_core::{Offset, PartitionId, Record, Timestamp};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::client::{BrokerClient, OffsetBounds, ReadBatch, ReadRequest};
use crate::error::{BrokerError, BrokerResult};

/// Configuration for fault injection in the memory broker.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read failing. Range: 0.0 - 1.0.
    pub read_fail_rate: f64,
    /// Partitions whose reads and offset lookups always fail.
    pub unavailable_partitions: HashSet<PartitionId>,
    /// Added latency for every read of a partition.
    pub read_latency: HashMap<PartitionId, Duration>,
}

impl FaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the read fail rate.
    #[must_use]
    pub const fn with_read_fail_rate(mut self, rate: f64) -> Self {
        self.read_fail_rate = rate;
        self
    }

    /// Marks a partition as unreachable.
    #[must_use]
    pub fn with_unavailable_partition(mut self, partition: PartitionId) -> Self {
        self.unavailable_partitions.insert(partition);
        self
    }

    /// Adds read latency to a partition.
    #[must_use]
    pub fn with_read_latency(mut self, partition: PartitionId, latency: Duration) -> Self {
        self.read_latency.insert(partition, latency);
        self
    }
}

/// Statistics tracking for reads and injected faults.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultStats {
    /// Total reads attempted.
    pub reads: u64,
    /// Reads that failed by injection or unavailability.
    pub read_failures: u64,
    /// Reads that ran into their timeout.
    pub read_timeouts: u64,
}

/// One partition's in-memory log.
#[derive(Debug, Default)]
struct PartitionLog {
    /// Offset of `records[0]`.
    log_start_offset: Offset,
    /// Retained records, dense by offset.
    records: Vec<Record>,
}

impl PartitionLog {
    fn log_end_offset(&self) -> Offset {
        Offset::new(self.log_start_offset.get() + self.records.len() as u64)
    }

    fn bounds(&self) -> OffsetBounds {
        OffsetBounds::new(self.log_start_offset, self.log_end_offset())
    }

    #[allow(clippy::cast_possible_truncation)] // Index is bounded by records.len().
    fn index_of(&self, offset: Offset) -> usize {
        (offset.get() - self.log_start_offset.get()) as usize
    }
}

/// In-memory broker for tests and demos.
///
/// Cloning is cheap; clones share the same logs and fault state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    /// Topic name to partition logs.
    topics: Arc<RwLock<HashMap<String, BTreeMap<PartitionId, PartitionLog>>>>,
    /// Fault injection configuration.
    faults: Arc<RwLock<FaultConfig>>,
    /// Seed for deterministic fault injection.
    seed: u64,
    /// Operation counter for deterministic fault injection.
    op_counter: Arc<AtomicU64>,
    /// Read and fault statistics.
    stats: Arc<RwLock<FaultStats>>,
}

impl MemoryBroker {
    /// Creates an empty broker without faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty broker with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: FaultConfig) -> Self {
        Self {
            faults: Arc::new(RwLock::new(config)),
            seed,
            ..Self::default()
        }
    }

    /// Replaces the fault configuration.
    pub async fn set_faults(&self, config: FaultConfig) {
        *self.faults.write().await = config;
    }

    /// Returns a snapshot of read and fault statistics.
    pub async fn stats(&self) -> FaultStats {
        *self.stats.read().await
    }

    /// Creates a topic with empty partitions `0..partition_count`.
    ///
    /// Creating an existing topic leaves it untouched.
    pub async fn create_topic(&self, topic: &str, partition_count: u32) {
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_insert_with(|| {
            (0..u64::from(partition_count))
                .map(|p| (PartitionId::new(p), PartitionLog::default()))
                .collect()
        });
        debug!(topic = %topic, partitions = partition_count, "Created topic");
    }

    /// Appends records to a partition, assigning partition and offsets.
    ///
    /// Returns the offset of the first appended record.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or partition does not exist.
    pub async fn append(
        &self,
        topic: &str,
        partition: PartitionId,
        records: Vec<Record>,
    ) -> BrokerResult<Offset> {
        let mut topics = self.topics.write().await;
        let log = Self::partition_mut(&mut topics, topic, partition)?;

        let base = log.log_end_offset();
        let mut next = base;
        for mut record in records {
            record.partition = partition;
            record.offset = next;
            next = next.next();
            log.records.push(record);
        }
        Ok(base)
    }

    /// Deletes every record below `offset`, as retention would.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or partition does not exist.
    pub async fn truncate_before(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> BrokerResult<()> {
        let mut topics = self.topics.write().await;
        let log = Self::partition_mut(&mut topics, topic, partition)?;

        let target = offset.min(log.log_end_offset());
        if target > log.log_start_offset {
            let drop_count = log.index_of(target);
            log.records.drain(..drop_count);
            log.log_start_offset = target;
        }
        Ok(())
    }

    fn partition_mut<'a>(
        topics: &'a mut HashMap<String, BTreeMap<PartitionId, PartitionLog>>,
        topic: &str,
        partition: PartitionId,
    ) -> BrokerResult<&'a mut PartitionLog> {
        topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })?
            .get_mut(&partition)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })
    }

    async fn check_available(&self, partition: PartitionId) -> BrokerResult<()> {
        if self.faults.read().await.unavailable_partitions.contains(&partition) {
            return Err(BrokerError::Unavailable {
                partition,
                message: "partition leader unreachable".to_string(),
            });
        }
        Ok(())
    }

    /// Deterministic fault decision from seed and operation counter.
    #[allow(clippy::cast_precision_loss)] // Precision loss is irrelevant for a probability.
    fn should_inject_fault(&self, rate: f64, counter: u64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0xc6a4_a793_5bd1_e995);
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn list_partitions(&self, topic: &str) -> BrokerResult<Vec<PartitionId>> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|partitions| partitions.keys().copied().collect())
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })
    }

    async fn offset_bounds(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> BrokerResult<OffsetBounds> {
        self.check_available(partition).await?;

        let topics = self.topics.read().await;
        let log = topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })?
            .get(&partition)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })?;
        Ok(log.bounds())
    }

    async fn offset_for_timestamp(
        &self,
        topic: &str,
        partition: PartitionId,
        timestamp: Timestamp,
    ) -> BrokerResult<Option<Offset>> {
        self.check_available(partition).await?;

        let topics = self.topics.read().await;
        let log = topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })?
            .get(&partition)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })?;

        Ok(log
            .records
            .iter()
            .find(|record| record.timestamp >= timestamp)
            .map(|record| record.offset))
    }

    #[allow(clippy::cast_possible_truncation)] // Latencies in tests are far below u64::MAX ms.
    async fn read(&self, topic: &str, request: ReadRequest) -> BrokerResult<ReadBatch> {
        let counter = self.op_counter.fetch_add(1, Ordering::Relaxed);
        self.stats.write().await.reads += 1;

        let (latency, fail) = {
            let faults = self.faults.read().await;
            let unavailable = faults.unavailable_partitions.contains(&request.partition);
            (
                faults.read_latency.get(&request.partition).copied(),
                unavailable || self.should_inject_fault(faults.read_fail_rate, counter),
            )
        };

        if let Some(latency) = latency {
            if latency > request.timeout {
                tokio::time::sleep(request.timeout).await;
                self.stats.write().await.read_timeouts += 1;
                return Err(BrokerError::Timeout {
                    operation: "read",
                    waited_ms: request.timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(latency).await;
        }

        if fail {
            self.stats.write().await.read_failures += 1;
            return Err(BrokerError::Unavailable {
                partition: request.partition,
                message: "injected read failure".to_string(),
            });
        }

        let topics = self.topics.read().await;
        let log = topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })?
            .get(&request.partition)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: topic.to_string(),
                partition: request.partition,
            })?;

        let bounds = log.bounds();
        if request.offset < bounds.earliest {
            return Err(BrokerError::OffsetOutOfRange {
                offset: request.offset,
                earliest: bounds.earliest,
                latest: bounds.latest,
            });
        }
        if request.offset >= bounds.latest {
            return Ok(ReadBatch {
                records: Vec::new(),
                next_offset: request.offset,
                hit_log_end: true,
            });
        }

        let mut records = Vec::new();
        let mut bytes_read: u64 = 0;
        for record in log.records[log.index_of(request.offset)..]
            .iter()
            .take(request.max_records as usize)
        {
            let size = record.size() as u64;
            // The first record is always returned so readers make progress.
            if bytes_read + size > request.max_bytes && !records.is_empty() {
                break;
            }
            bytes_read += size;
            records.push(record.clone());
        }

        let next_offset = records
            .last()
            .map_or(request.offset, |record| record.offset.next());

        trace!(
            topic = %topic,
            partition = %request.partition,
            offset = %request.offset,
            count = records.len(),
            "Read records"
        );

        Ok(ReadBatch {
            records,
            next_offset,
            hit_log_end: next_offset >= bounds.latest,
        })
    }
}
