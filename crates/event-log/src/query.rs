use chrono::{DateTime, Utc};

use crate::{LogRecord, Offset};

/// Builder for filtering records in a topic.
///
/// Results are ordered by partition, then offset.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    /// The topic to read from.
    pub topic: String,

    /// Restrict to one partition.
    pub partition: Option<u32>,

    /// Minimum offset (inclusive). Only meaningful with a partition filter.
    pub from_offset: Option<Offset>,

    /// Filter by routing key.
    pub key: Option<String>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Filter by records at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by records at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Creates a query over a whole topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            from_offset: None,
            key: None,
            event_types: None,
            from_timestamp: None,
            to_timestamp: None,
            limit: None,
        }
    }

    /// Filters by partition.
    pub fn partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Filters to records at or after this offset.
    pub fn from_offset(mut self, offset: Offset) -> Self {
        self.from_offset = Some(offset);
        self
    }

    /// Filters by routing key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Filters by event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types = Some(vec![event_type.into()]);
        self
    }

    /// Filters to records after this timestamp (inclusive).
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters to records before this timestamp (inclusive).
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if a record satisfies every filter except the limit.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if record.topic != self.topic {
            return false;
        }
        if let Some(partition) = self.partition
            && record.partition != partition
        {
            return false;
        }
        if let Some(from) = self.from_offset
            && record.offset < from
        {
            return false;
        }
        if let Some(ref key) = self.key
            && &record.key != key
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&record.event_type)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && record.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && record.timestamp > to
        {
            return false;
        }
        true
    }
}
