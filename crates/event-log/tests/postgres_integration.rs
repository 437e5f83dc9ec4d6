//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p event-log --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use event_log::{
    EventLog, EventLogError, EventLogExt, Offset, PostgresEventLog, ProducerRecord, RecordQuery,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_log_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh log with its own pool and cleared tables
async fn get_test_log() -> PostgresEventLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE log_records, log_topics")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventLog::new(pool)
}

fn record(key: &str, event_type: &str) -> ProducerRecord {
    ProducerRecord::builder()
        .topic("orders")
        .key(key)
        .event_type(event_type)
        .payload_raw(serde_json::json!({ "key": key }))
        .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_append_and_read_back() {
    let log = get_test_log().await;
    log.create_topic("orders", 1).await.unwrap();

    let meta = log.append(record("order-1", "OrderCompleted")).await.unwrap();
    assert_eq!(meta.partition, 0);
    assert_eq!(meta.offset, Offset::earliest());
    assert!(!meta.duplicate);

    let records = log.read("orders", 0, Offset::earliest(), 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "order-1");
    assert_eq!(records[0].event_type, "OrderCompleted");
    assert_eq!(
        records[0].headers.get("traceparent").map(String::as_str),
        Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
    );
}

#[tokio::test]
async fn test_offsets_increase_within_partition() {
    let log = get_test_log().await;
    log.create_topic("orders", 1).await.unwrap();

    for i in 0..3 {
        let meta = log
            .append(record(&format!("order-{i}"), "OrderCompleted"))
            .await
            .unwrap();
        assert_eq!(meta.offset, Offset::new(i));
    }
    assert_eq!(log.end_offset("orders", 0).await.unwrap(), Offset::new(3));
}

#[tokio::test]
async fn test_duplicate_record_id_returns_original_position() {
    let log = get_test_log().await;
    log.create_topic("orders", 4).await.unwrap();

    let rec = record("order-9", "OrderFailed");
    let first = log.append(rec.clone()).await.unwrap();
    let second = log.append(rec).await.unwrap();

    assert!(second.duplicate);
    assert_eq!(first.partition, second.partition);
    assert_eq!(first.offset, second.offset);
    assert_eq!(log.record_count("orders").await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_topic_and_partition_mismatch() {
    let log = get_test_log().await;

    let result = log.append(record("a", "OrderCompleted")).await;
    assert!(matches!(result, Err(EventLogError::UnknownTopic(_))));

    log.create_topic("orders", 2).await.unwrap();
    log.create_topic("orders", 2).await.unwrap();
    let result = log.create_topic("orders", 3).await;
    assert!(matches!(result, Err(EventLogError::PartitionMismatch { .. })));
}

#[tokio::test]
async fn test_query_by_key_and_type() {
    let log = get_test_log().await;
    log.create_topic("orders", 3).await.unwrap();

    log.append(record("order-a", "OrderCompleted")).await.unwrap();
    log.append(record("order-b", "OrderFailed")).await.unwrap();
    log.append(record("order-a", "OrderCompleted")).await.unwrap();

    let by_key = log.records_for_key("orders", "order-a").await.unwrap();
    assert_eq!(by_key.len(), 2);
    assert!(by_key[0].offset < by_key[1].offset);

    let failed = log
        .query(RecordQuery::topic("orders").event_type("OrderFailed"))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key, "order-b");
}

#[tokio::test]
async fn test_concurrent_appends_get_distinct_offsets() {
    let log = get_test_log().await;
    log.create_topic("orders", 1).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            log.append(record(&format!("order-{i}"), "OrderCompleted"))
                .await
                .unwrap()
        }));
    }

    let mut offsets = Vec::new();
    for handle in handles {
        offsets.push(handle.await.unwrap().offset.as_i64());
    }
    offsets.sort_unstable();
    assert_eq!(offsets, (0..10).collect::<Vec<_>>());
}
