//! Order event publishing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use domain::{DomainEvent, OrderResultEvent};
use event_log::{EventLog, ProducerRecord, RecordId, RecordMetadata};

use crate::error::PublishError;
use crate::propagation::TraceContext;
use crate::retry::RetryPolicy;

/// Default topic for order result events.
pub const ORDERS_TOPIC: &str = "orders";

/// Writes order result events to durable storage.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event, retrying transient failures.
    ///
    /// Delivery is at-least-once on the producer side; the record ID is the
    /// event ID, so a retry after a lost acknowledgement is not duplicated.
    async fn publish(
        &self,
        event: &OrderResultEvent,
        trace: &TraceContext,
    ) -> Result<RecordMetadata, PublishError>;
}

/// Publishes to a topic of an [`EventLog`], keyed by order ID.
#[derive(Clone)]
pub struct LogEventPublisher<L> {
    log: L,
    topic: String,
    retry: RetryPolicy,
}

impl<L: EventLog> LogEventPublisher<L> {
    pub fn new(log: L) -> Self {
        Self {
            log,
            topic: ORDERS_TOPIC.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Creates the topic if it does not exist yet.
    pub async fn ensure_topic(&self, partitions: u32) -> Result<(), PublishError> {
        self.log
            .create_topic(&self.topic, partitions)
            .await
            .map_err(PublishError::Rejected)
    }

    fn record(
        &self,
        event: &OrderResultEvent,
        trace: &TraceContext,
    ) -> Result<ProducerRecord, PublishError> {
        let mut headers = BTreeMap::<String, String>::new();
        trace.inject(&mut headers);

        ProducerRecord::builder()
            .record_id(RecordId::from_uuid(event.event_id))
            .topic(&self.topic)
            .key(event.order_id.to_string())
            .event_type(event.event_type())
            .timestamp(event.occurred_at)
            .payload_raw(serde_json::to_value(event)?)
            .headers(headers)
            .build()
            .map_err(PublishError::Rejected)
    }
}

#[async_trait]
impl<L: EventLog> EventPublisher for LogEventPublisher<L> {
    #[tracing::instrument(skip_all, fields(order_id = %event.order_id, topic = %self.topic))]
    async fn publish(
        &self,
        event: &OrderResultEvent,
        trace: &TraceContext,
    ) -> Result<RecordMetadata, PublishError> {
        let record = self.record(event, trace)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delays = self.retry.delays();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.log.append(record.clone()).await {
                Ok(metadata) => {
                    metrics::counter!(
                        "order_events_published_total",
                        "event_type" => event.event_type()
                    )
                    .increment(1);
                    tracing::info!(
                        partition = metadata.partition,
                        offset = %metadata.offset,
                        duplicate = metadata.duplicate,
                        attempts,
                        "order event published"
                    );
                    return Ok(metadata);
                }
                Err(err) if !err.is_retryable() => {
                    metrics::counter!("order_event_publish_failures_total", "reason" => "rejected")
                        .increment(1);
                    return Err(PublishError::Rejected(err));
                }
                Err(err) if attempts >= max_attempts => {
                    metrics::counter!("order_event_publish_failures_total", "reason" => "exhausted")
                        .increment(1);
                    return Err(PublishError::Exhausted {
                        attempts,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = delays.next().unwrap_or(self.retry.max_delay);
                    tracing::warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "order event publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
