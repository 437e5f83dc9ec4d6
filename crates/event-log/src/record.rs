use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EventLogError, Result};

/// Producer-assigned unique identifier for a record.
///
/// The log deduplicates on this ID: appending a record whose ID is already
/// stored returns the original position instead of writing a second copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record within a partition.
///
/// Offsets start at 0 for the first record of a partition and increase by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    /// Creates an offset from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The offset of the first record in a partition.
    pub fn earliest() -> Self {
        Self(0)
    }

    /// Returns the next offset.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw offset value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A record as handed to the log by a producer, before it has a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// Deduplication identity of this record.
    pub record_id: RecordId,

    /// Destination topic.
    pub topic: String,

    /// Routing key. Records with equal keys share a partition.
    pub key: String,

    /// Type of the payload (e.g., "OrderCompleted").
    pub event_type: String,

    /// When the producer created the record.
    pub timestamp: DateTime<Utc>,

    /// The record body.
    pub payload: serde_json::Value,

    /// Transport headers such as trace context.
    pub headers: BTreeMap<String, String>,
}

impl ProducerRecord {
    /// Creates a new producer record builder.
    pub fn builder() -> ProducerRecordBuilder {
        ProducerRecordBuilder::default()
    }
}

/// Builder for constructing producer records.
#[derive(Debug, Default)]
pub struct ProducerRecordBuilder {
    record_id: Option<RecordId>,
    topic: Option<String>,
    key: Option<String>,
    event_type: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    headers: BTreeMap<String, String>,
}

impl ProducerRecordBuilder {
    /// Sets the record ID. If not set, a new ID will be generated.
    pub fn record_id(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Sets the destination topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the routing key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a header entry.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds every header from an iterator.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Builds the record, failing if topic, key, event type or payload is missing.
    pub fn build(self) -> Result<ProducerRecord> {
        let missing = |field: &str| EventLogError::InvalidRecord(format!("{field} is required"));
        Ok(ProducerRecord {
            record_id: self.record_id.unwrap_or_default(),
            topic: self.topic.ok_or_else(|| missing("topic"))?,
            key: self.key.ok_or_else(|| missing("key"))?,
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            headers: self.headers,
        })
    }
}

/// A stored record together with its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub partition: u32,
    pub offset: Offset,
    pub record_id: RecordId,
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub headers: BTreeMap<String, String>,
}

impl LogRecord {
    /// Positions a producer record at the given partition and offset.
    pub fn from_producer(record: ProducerRecord, partition: u32, offset: Offset) -> Self {
        Self {
            partition,
            offset,
            record_id: record.record_id,
            topic: record.topic,
            key: record.key,
            event_type: record.event_type,
            timestamp: record.timestamp,
            payload: record.payload,
            headers: record.headers,
        }
    }

    /// Returns the metadata describing where this record lives.
    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            duplicate: false,
        }
    }

    /// Deserializes the payload into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Acknowledgement returned by a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
    /// True when the record ID was already stored and nothing new was written.
    pub duplicate: bool,
}
