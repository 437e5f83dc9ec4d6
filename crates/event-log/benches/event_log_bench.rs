use criterion::{Criterion, criterion_group, criterion_main};
use event_log::{EventLog, EventLogExt, InMemoryEventLog, ProducerRecord, RecordId};

fn make_record(key: &str) -> ProducerRecord {
    ProducerRecord::builder()
        .topic("orders")
        .key(key)
        .event_type("OrderCompleted")
        .payload_raw(serde_json::json!({
            "outcome": "completed",
            "order_id": key,
        }))
        .build()
        .unwrap()
}

fn bench_append_single_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_log/append_single_record", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::with_topic("orders", 6).await.unwrap();
                log.append(make_record("order-1")).await.unwrap();
            });
        });
    });
}

fn bench_append_100_keys(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_log/append_100_keys", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::with_topic("orders", 6).await.unwrap();
                for i in 0..100 {
                    log.append(make_record(&format!("order-{i}"))).await.unwrap();
                }
            });
        });
    });
}

fn bench_duplicate_append(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = rt.block_on(async { InMemoryEventLog::with_topic("orders", 6).await.unwrap() });
    let mut record = make_record("order-dup");
    record.record_id = RecordId::new();
    rt.block_on(async { log.append(record.clone()).await.unwrap() });

    c.bench_function("event_log/duplicate_append", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.append(record.clone()).await.unwrap();
            });
        });
    });
}

fn bench_records_for_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = rt.block_on(async {
        let log = InMemoryEventLog::with_topic("orders", 6).await.unwrap();
        for i in 0..1000 {
            log.append(make_record(&format!("order-{}", i % 50)))
                .await
                .unwrap();
        }
        log
    });

    c.bench_function("event_log/records_for_key_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.records_for_key("orders", "order-7").await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_record,
    bench_append_100_keys,
    bench_duplicate_append,
    bench_records_for_key
);
criterion_main!(benches);
