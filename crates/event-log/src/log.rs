use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{LogRecord, Offset, ProducerRecord, RecordMetadata, RecordQuery, Result};

/// A stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<LogRecord>> + Send>>;

/// Core trait for partitioned log implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Creates a topic with a fixed number of partitions.
    ///
    /// Creating an existing topic with the same partition count is a no-op;
    /// a different count fails with `PartitionMismatch`.
    async fn create_topic(&self, topic: &str, partitions: u32) -> Result<()>;

    /// Returns the partition count of a topic.
    async fn partition_count(&self, topic: &str) -> Result<u32>;

    /// Appends a record to the partition selected by its key.
    ///
    /// If a record with the same `record_id` was already appended, nothing is
    /// written and the original position is returned with `duplicate = true`.
    async fn append(&self, record: ProducerRecord) -> Result<RecordMetadata>;

    /// Reads up to `max` records from one partition starting at `from` (inclusive).
    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max: usize,
    ) -> Result<Vec<LogRecord>>;

    /// Returns the offset the next record in the partition will receive.
    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset>;

    /// Retrieves records matching a query.
    async fn query(&self, query: RecordQuery) -> Result<Vec<LogRecord>>;

    /// Streams every record in a topic, partition by partition.
    async fn stream_topic(&self, topic: &str) -> Result<RecordStream>;
}

/// Extension trait providing convenience methods for logs.
#[async_trait]
pub trait EventLogExt: EventLog {
    /// Reads every record of a topic ordered by partition, then offset.
    async fn read_all(&self, topic: &str) -> Result<Vec<LogRecord>> {
        self.query(RecordQuery::topic(topic)).await
    }

    /// Reads every record of a topic sharing a routing key, in offset order.
    async fn records_for_key(&self, topic: &str, key: &str) -> Result<Vec<LogRecord>> {
        self.query(RecordQuery::topic(topic).key(key)).await
    }

    /// Returns the total number of records across all partitions of a topic.
    async fn record_count(&self, topic: &str) -> Result<i64> {
        let partitions = self.partition_count(topic).await?;
        let mut total = 0;
        for partition in 0..partitions {
            total += self.end_offset(topic, partition).await?.as_i64();
        }
        Ok(total)
    }
}

// Blanket implementation for all EventLog implementations
impl<T: EventLog + ?Sized> EventLogExt for T {}

/// Error returned when a record fails pre-append validation.
#[derive(Debug, Clone)]
pub struct RecordValidationError {
    pub message: String,
}

impl std::fmt::Display for RecordValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record validation error: {}", self.message)
    }
}

impl std::error::Error for RecordValidationError {}

/// Validates a record before appending.
pub fn validate_record(record: &ProducerRecord) -> std::result::Result<(), RecordValidationError> {
    let blank = |field: &str| RecordValidationError {
        message: format!("{field} must not be empty"),
    };

    if record.topic.trim().is_empty() {
        return Err(blank("topic"));
    }
    if record.key.is_empty() {
        return Err(blank("key"));
    }
    if record.event_type.trim().is_empty() {
        return Err(blank("event_type"));
    }

    Ok(())
}

impl From<RecordValidationError> for crate::EventLogError {
    fn from(err: RecordValidationError) -> Self {
        crate::EventLogError::InvalidRecord(err.message)
    }
}
