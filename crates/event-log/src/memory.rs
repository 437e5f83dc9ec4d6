use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventLogError, LogRecord, Offset, ProducerRecord, RecordId, RecordMetadata, RecordQuery,
    Result,
    log::{EventLog, RecordStream, validate_record},
    partition_for,
};

#[derive(Debug, Default)]
struct LogState {
    /// topic -> partitions -> records in offset order
    topics: HashMap<String, Vec<Vec<LogRecord>>>,
    index: HashMap<RecordId, RecordMetadata>,
    /// Remaining appends to reject with `Unavailable`.
    unavailable_appends: usize,
    append_attempts: usize,
}

/// In-memory log implementation for tests and the demo binary.
///
/// Provides the same interface and deduplication semantics as the
/// PostgreSQL implementation, plus hooks to simulate broker outages.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    state: Arc<RwLock<LogState>>,
}

impl InMemoryEventLog {
    /// Creates a new empty in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log with one topic already present.
    pub async fn with_topic(topic: &str, partitions: u32) -> Result<Self> {
        let log = Self::new();
        log.create_topic(topic, partitions).await?;
        Ok(log)
    }

    /// Rejects the next `count` appends with `EventLogError::Unavailable`.
    pub async fn fail_next_appends(&self, count: usize) {
        self.state.write().await.unavailable_appends = count;
    }

    /// Returns how many appends were attempted, including rejected ones.
    pub async fn append_attempts(&self) -> usize {
        self.state.read().await.append_attempts
    }

    /// Returns the total number of records stored across all topics.
    pub async fn total_records(&self) -> usize {
        self.state
            .read()
            .await
            .topics
            .values()
            .flat_map(|partitions| partitions.iter())
            .map(Vec::len)
            .sum()
    }
}

fn partitions_of<'a>(state: &'a LogState, topic: &str) -> Result<&'a Vec<Vec<LogRecord>>> {
    state
        .topics
        .get(topic)
        .ok_or_else(|| EventLogError::UnknownTopic(topic.to_string()))
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn create_topic(&self, topic: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(EventLogError::InvalidRecord(
                "topic must have at least one partition".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let existing = state.topics.get(topic).map(|p| p.len() as u32);
        match existing {
            Some(existing) if existing != partitions => Err(EventLogError::PartitionMismatch {
                topic: topic.to_string(),
                existing,
                requested: partitions,
            }),
            Some(_) => Ok(()),
            None => {
                state
                    .topics
                    .insert(topic.to_string(), vec![Vec::new(); partitions as usize]);
                Ok(())
            }
        }
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let state = self.state.read().await;
        Ok(partitions_of(&state, topic)?.len() as u32)
    }

    async fn append(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        validate_record(&record)?;

        let mut state = self.state.write().await;
        state.append_attempts += 1;

        if state.unavailable_appends > 0 {
            state.unavailable_appends -= 1;
            return Err(EventLogError::Unavailable(
                "simulated broker outage".to_string(),
            ));
        }

        if let Some(existing) = state.index.get(&record.record_id) {
            return Ok(RecordMetadata {
                duplicate: true,
                ..existing.clone()
            });
        }

        let record_id = record.record_id;
        let topic = record.topic.clone();
        let partitions = state
            .topics
            .get_mut(&topic)
            .ok_or_else(|| EventLogError::UnknownTopic(topic.clone()))?;

        let partition = partition_for(&record.key, partitions.len() as u32);
        let log = &mut partitions[partition as usize];
        let offset = Offset::new(log.len() as i64);
        let stored = LogRecord::from_producer(record, partition, offset);
        let metadata = stored.metadata();
        log.push(stored);

        state.index.insert(record_id, metadata.clone());
        Ok(metadata)
    }

    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max: usize,
    ) -> Result<Vec<LogRecord>> {
        let state = self.state.read().await;
        let partitions = partitions_of(&state, topic)?;
        let log = partitions
            .get(partition as usize)
            .ok_or_else(|| EventLogError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            })?;

        let start = from.as_i64().max(0) as usize;
        Ok(log.iter().skip(start).take(max).cloned().collect())
    }

    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset> {
        let state = self.state.read().await;
        let partitions = partitions_of(&state, topic)?;
        partitions
            .get(partition as usize)
            .map(|log| Offset::new(log.len() as i64))
            .ok_or_else(|| EventLogError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            })
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<LogRecord>> {
        let state = self.state.read().await;
        let partitions = partitions_of(&state, &query.topic)?;

        let matching = partitions
            .iter()
            .flat_map(|log| log.iter())
            .filter(|record| query.matches(record))
            .cloned();

        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn stream_topic(&self, topic: &str) -> Result<RecordStream> {
        use futures_util::stream;

        let state = self.state.read().await;
        let records: Vec<_> = partitions_of(&state, topic)?
            .iter()
            .flat_map(|log| log.iter().cloned())
            .map(Ok)
            .collect();

        Ok(Box::pin(stream::iter(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLogExt;

    fn record(key: &str) -> ProducerRecord {
        ProducerRecord::builder()
            .topic("orders")
            .key(key)
            .event_type("OrderCompleted")
            .payload_raw(serde_json::json!({"key": key}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_offsets_per_partition() {
        let log = InMemoryEventLog::with_topic("orders", 1).await.unwrap();

        let first = log.append(record("a")).await.unwrap();
        let second = log.append(record("b")).await.unwrap();

        assert_eq!(first.partition, 0);
        assert_eq!(first.offset, Offset::new(0));
        assert_eq!(second.offset, Offset::new(1));
        assert!(!first.duplicate);
    }

    #[tokio::test]
    async fn test_same_key_lands_on_same_partition() {
        let log = InMemoryEventLog::with_topic("orders", 8).await.unwrap();

        let first = log.append(record("order-42")).await.unwrap();
        let second = log.append(record("order-42")).await.unwrap();

        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset.next());
    }

    #[tokio::test]
    async fn test_duplicate_record_id_is_not_written_twice() {
        let log = InMemoryEventLog::with_topic("orders", 3).await.unwrap();
        let rec = record("order-1");

        let first = log.append(rec.clone()).await.unwrap();
        let again = log.append(rec).await.unwrap();

        assert!(again.duplicate);
        assert_eq!(again.offset, first.offset);
        assert_eq!(again.partition, first.partition);
        assert_eq!(log.total_records().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_rejected() {
        let log = InMemoryEventLog::new();
        let result = log.append(record("a")).await;
        assert!(matches!(result, Err(EventLogError::UnknownTopic(_))));
    }

    #[tokio::test]
    async fn test_create_topic_is_idempotent_but_checks_partitions() {
        let log = InMemoryEventLog::new();
        log.create_topic("orders", 3).await.unwrap();
        log.create_topic("orders", 3).await.unwrap();

        let result = log.create_topic("orders", 4).await;
        assert!(matches!(
            result,
            Err(EventLogError::PartitionMismatch {
                existing: 3,
                requested: 4,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_simulated_outage_rejects_then_recovers() {
        let log = InMemoryEventLog::with_topic("orders", 1).await.unwrap();
        log.fail_next_appends(2).await;

        assert!(log.append(record("a")).await.unwrap_err().is_retryable());
        assert!(log.append(record("a")).await.is_err());
        assert!(log.append(record("a")).await.is_ok());
        assert_eq!(log.append_attempts().await, 3);
        assert_eq!(log.total_records().await, 1);
    }

    #[tokio::test]
    async fn test_read_from_offset() {
        let log = InMemoryEventLog::with_topic("orders", 1).await.unwrap();
        for key in ["a", "b", "c", "d"] {
            log.append(record(key)).await.unwrap();
        }

        let records = log.read("orders", 0, Offset::new(1), 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "b");
        assert_eq!(records[1].key, "c");
        assert_eq!(log.end_offset("orders", 0).await.unwrap(), Offset::new(4));
    }

    #[tokio::test]
    async fn test_read_invalid_partition() {
        let log = InMemoryEventLog::with_topic("orders", 2).await.unwrap();
        let result = log.read("orders", 5, Offset::earliest(), 10).await;
        assert!(matches!(
            result,
            Err(EventLogError::InvalidPartition { partition: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_records_for_key_and_count() {
        let log = InMemoryEventLog::with_topic("orders", 4).await.unwrap();
        log.append(record("x")).await.unwrap();
        log.append(record("y")).await.unwrap();
        log.append(record("x")).await.unwrap();

        let xs = log.records_for_key("orders", "x").await.unwrap();
        assert_eq!(xs.len(), 2);
        assert!(xs[0].offset < xs[1].offset);
        assert_eq!(log.record_count("orders").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stream_topic_yields_all_records() {
        use futures_util::StreamExt;

        let log = InMemoryEventLog::with_topic("orders", 2).await.unwrap();
        for key in ["a", "b", "c"] {
            log.append(record(key)).await.unwrap();
        }

        let stream = log.stream_topic("orders").await.unwrap();
        let records: Vec<_> = stream.collect().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.is_ok()));
    }
}
