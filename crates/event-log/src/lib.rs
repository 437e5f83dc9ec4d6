//! Partitioned, append-only record log.
//!
//! Records are routed to a partition by key and receive a monotonically
//! increasing offset within that partition. Appends are idempotent on the
//! producer-assigned record ID, so a producer may retry freely without
//! creating duplicates.

pub mod error;
pub mod log;
pub mod memory;
pub mod partition;
pub mod postgres;
pub mod query;
pub mod record;

pub use error::{EventLogError, Result};
pub use log::{EventLog, EventLogExt, RecordStream};
pub use memory::InMemoryEventLog;
pub use partition::partition_for;
pub use postgres::PostgresEventLog;
pub use query::RecordQuery;
pub use record::{
    LogRecord, Offset, ProducerRecord, ProducerRecordBuilder, RecordId, RecordMetadata,
};
