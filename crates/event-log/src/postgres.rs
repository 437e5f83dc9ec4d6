use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventLogError, LogRecord, Offset, ProducerRecord, RecordId, RecordMetadata, RecordQuery,
    Result,
    log::{EventLog, RecordStream, validate_record},
    partition_for,
};

const RECORD_COLUMNS: &str = "record_id, topic, partition_id, log_offset, record_key, event_type, timestamp, payload, headers";

/// PostgreSQL-backed log implementation.
///
/// Offsets are assigned under a transaction-scoped advisory lock on
/// (topic, partition), so concurrent producers never race for an offset.
#[derive(Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    /// Creates a new PostgreSQL log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<LogRecord> {
        let headers_json: serde_json::Value = row.try_get("headers")?;
        let headers: BTreeMap<String, String> = serde_json::from_value(headers_json)?;

        Ok(LogRecord {
            partition: row.try_get::<i32, _>("partition_id")? as u32,
            offset: Offset::new(row.try_get("log_offset")?),
            record_id: RecordId::from_uuid(row.try_get::<Uuid, _>("record_id")?),
            topic: row.try_get("topic")?,
            key: row.try_get("record_key")?,
            event_type: row.try_get("event_type")?,
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            headers,
        })
    }

    async fn existing_position(&self, record_id: RecordId) -> Result<Option<RecordMetadata>> {
        let row = sqlx::query(
            "SELECT topic, partition_id, log_offset FROM log_records WHERE record_id = $1",
        )
        .bind(record_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(RecordMetadata {
                topic: row.try_get("topic")?,
                partition: row.try_get::<i32, _>("partition_id")? as u32,
                offset: Offset::new(row.try_get("log_offset")?),
                duplicate: true,
            })),
            None => Ok(None),
        }
    }

    async fn check_partition(&self, topic: &str, partition: u32) -> Result<()> {
        let partitions = self.partition_count(topic).await?;
        if partition >= partitions {
            return Err(EventLogError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn create_topic(&self, topic: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(EventLogError::InvalidRecord(
                "topic must have at least one partition".to_string(),
            ));
        }

        sqlx::query("INSERT INTO log_topics (name, partitions) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(topic)
            .bind(partitions as i32)
            .execute(&self.pool)
            .await?;

        let existing = self.partition_count(topic).await?;
        if existing != partitions {
            return Err(EventLogError::PartitionMismatch {
                topic: topic.to_string(),
                existing,
                requested: partitions,
            });
        }
        Ok(())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let partitions: Option<i32> =
            sqlx::query_scalar("SELECT partitions FROM log_topics WHERE name = $1")
                .bind(topic)
                .fetch_optional(&self.pool)
                .await?;

        partitions
            .map(|p| p as u32)
            .ok_or_else(|| EventLogError::UnknownTopic(topic.to_string()))
    }

    async fn append(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        validate_record(&record)?;

        if let Some(existing) = self.existing_position(record.record_id).await? {
            return Ok(existing);
        }

        let partitions = self.partition_count(&record.topic).await?;
        let partition = partition_for(&record.key, partitions);

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), $2)")
            .bind(&record.topic)
            .bind(partition as i32)
            .execute(&mut *tx)
            .await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(log_offset) + 1, 0) FROM log_records WHERE topic = $1 AND partition_id = $2",
        )
        .bind(&record.topic)
        .bind(partition as i32)
        .fetch_one(&mut *tx)
        .await?;

        let headers_json = serde_json::to_value(&record.headers)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO log_records (record_id, topic, partition_id, log_offset, record_key, event_type, timestamp, payload, headers)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (record_id) DO NOTHING
            "#,
        )
        .bind(record.record_id.as_uuid())
        .bind(&record.topic)
        .bind(partition as i32)
        .bind(next)
        .bind(&record.key)
        .bind(&record.event_type)
        .bind(record.timestamp)
        .bind(&record.payload)
        .bind(headers_json)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if inserted == 0 {
            // Lost a race with a concurrent append of the same record.
            return self
                .existing_position(record.record_id)
                .await?
                .ok_or_else(|| EventLogError::Unavailable("record vanished after conflict".into()));
        }

        metrics::counter!("event_log_records_appended_total").increment(1);
        tracing::debug!(topic = %record.topic, partition, offset = next, "record appended");

        Ok(RecordMetadata {
            topic: record.topic,
            partition,
            offset: Offset::new(next),
            duplicate: false,
        })
    }

    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max: usize,
    ) -> Result<Vec<LogRecord>> {
        self.check_partition(topic, partition).await?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM log_records WHERE topic = $1 AND partition_id = $2 AND log_offset >= $3 ORDER BY log_offset ASC LIMIT $4"
        );
        let rows = sqlx::query(&sql)
            .bind(topic)
            .bind(partition as i32)
            .bind(from.as_i64())
            .bind(max as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset> {
        self.check_partition(topic, partition).await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(log_offset) + 1, 0) FROM log_records WHERE topic = $1 AND partition_id = $2",
        )
        .bind(topic)
        .bind(partition as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(Offset::new(next))
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<LogRecord>> {
        // Surface UnknownTopic the same way the in-memory log does.
        self.partition_count(&query.topic).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM log_records WHERE topic = "
        ));
        builder.push_bind(query.topic.clone());

        if let Some(partition) = query.partition {
            builder.push(" AND partition_id = ").push_bind(partition as i32);
        }
        if let Some(from) = query.from_offset {
            builder.push(" AND log_offset >= ").push_bind(from.as_i64());
        }
        if let Some(key) = query.key {
            builder.push(" AND record_key = ").push_bind(key);
        }
        if let Some(event_types) = query.event_types {
            builder
                .push(" AND event_type = ANY(")
                .push_bind(event_types)
                .push(")");
        }
        if let Some(from) = query.from_timestamp {
            builder.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = query.to_timestamp {
            builder.push(" AND timestamp <= ").push_bind(to);
        }

        builder.push(" ORDER BY partition_id ASC, log_offset ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn stream_topic(&self, topic: &str) -> Result<RecordStream> {
        use futures_util::stream;

        let records: Vec<_> = self
            .query(RecordQuery::topic(topic))
            .await?
            .into_iter()
            .map(Ok)
            .collect();

        Ok(Box::pin(stream::iter(records)))
    }
}
