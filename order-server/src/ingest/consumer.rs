//! Kafka ingest consumer
//!
//! A single cooperative worker: poll → decode → validate → persist (with
//! retry while the failure is transient) → cache publish → commit. A
//! message that cannot be processed is routed to the DLQ and its offset is
//! still committed — once dead-lettered, it counts as handled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use shared::models::Order;
use shared::validation::Validator;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheWriter;
use crate::config::KafkaConfig;
use crate::db::{OrderStore, StoreError};
use crate::ingest::dlq::{envelope_headers, DlqStage};
use crate::retry::{self, Backoff, Policy, RetryError};
use crate::telemetry::Metrics;

const DLQ_SEND_TIMEOUT: Duration = Duration::from_secs(5);

enum Flow {
    Continue,
    Shutdown,
}

pub struct IngestConsumer {
    consumer: StreamConsumer,
    dlq: FutureProducer,
    topic: String,
    group_id: String,
    dlq_topic: String,
    validator: Validator,
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn CacheWriter>,
    metrics: Arc<Metrics>,
    policy: Policy,
    shutdown: CancellationToken,
}

impl IngestConsumer {
    /// Build the consumer and DLQ producer and subscribe to the source
    /// topic. Offsets are committed explicitly after each handled message.
    pub fn new(
        cfg: &KafkaConfig,
        validator: Validator,
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn CacheWriter>,
        metrics: Arc<Metrics>,
        shutdown: CancellationToken,
    ) -> Result<Self, KafkaError> {
        let brokers = cfg.brokers.join(",");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &cfg.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[cfg.topic.as_str()])?;

        let dlq: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()?;

        let policy = Policy {
            max_retries: cfg.dlq_max_retries,
            backoff: Backoff::new(cfg.dlq_backoff, cfg.dlq_backoff_cap, cfg.dlq_backoff_jitter),
        };

        Ok(Self {
            consumer,
            dlq,
            topic: cfg.topic.clone(),
            group_id: cfg.group_id.clone(),
            dlq_topic: cfg.dlq_topic.clone(),
            validator,
            store,
            cache,
            metrics,
            policy,
            shutdown,
        })
    }

    /// Consume until the shutdown token fires. The in-flight message is
    /// finished (or dead-lettered) before the loop exits.
    pub async fn run(self) {
        tracing::info!(
            topic = %self.topic,
            group_id = %self.group_id,
            dlq_topic = %self.dlq_topic,
            "ingest consumer started"
        );

        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.consumer.recv() => match result {
                    Ok(msg) => msg,
                    Err(err) => {
                        if self.shutdown.is_cancelled() {
                            break;
                        }
                        tracing::error!(error = %err, "kafka read error");
                        continue;
                    }
                },
            };

            match self.process(&msg).await {
                Flow::Continue => {
                    // Offsets advance even for dead-lettered messages.
                    if let Err(err) = self.consumer.commit_message(&msg, CommitMode::Async) {
                        tracing::warn!(error = %err, "offset commit failed");
                    }
                }
                Flow::Shutdown => break,
            }
        }

        tracing::info!("ingest consumer stopped");
    }

    async fn process(&self, msg: &BorrowedMessage<'_>) -> Flow {
        let payload = msg.payload().unwrap_or_default();

        let order: Order = match serde_json::from_slice(payload) {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, "invalid message");
                self.send_to_dlq(msg, DlqStage::Unmarshal, &err.to_string())
                    .await;
                return Flow::Continue;
            }
        };

        if let Err(errs) = self.validator.validate(&order) {
            tracing::warn!(order_uid = %order.order_uid, error = %errs, "validation failed");
            self.send_to_dlq(msg, DlqStage::Validation, &errs.to_string())
                .await;
            return Flow::Continue;
        }

        let attempts = self.policy.max_retries + 1;
        let persisted = retry::run(
            &self.shutdown,
            &self.policy,
            StoreError::is_transient,
            || self.store.insert_order(&order),
            |err, attempt, wait| {
                tracing::warn!(
                    order_uid = %order.order_uid,
                    attempt,
                    attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "failed to persist order, retrying"
                );
            },
        )
        .await;

        match persisted {
            Ok(()) => {}
            Err(RetryError::Cancelled) => return Flow::Shutdown,
            Err(RetryError::Failed(err)) => {
                tracing::error!(order_uid = %order.order_uid, error = %err, "failed to persist order");
                self.send_to_dlq(msg, DlqStage::Db, &err.to_string()).await;
                return Flow::Continue;
            }
        }

        // The cache is advisory; publishing cannot fail.
        let order_uid = order.order_uid.clone();
        self.cache.save(Arc::new(order)).await;
        self.metrics
            .orders_consumed
            .with_label_values(&["persisted"])
            .inc();
        tracing::info!(order_uid = %order_uid, "order persisted and cached");

        Flow::Continue
    }

    async fn send_to_dlq(&self, msg: &BorrowedMessage<'_>, stage: DlqStage, error: &str) {
        self.metrics
            .dlq_messages
            .with_label_values(&[stage.as_str()])
            .inc();
        self.metrics
            .orders_consumed
            .with_label_values(&["dlq"])
            .inc();

        let original: Vec<(String, Option<Vec<u8>>)> = msg
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                    .collect()
            })
            .unwrap_or_default();

        let pairs = envelope_headers(
            &original,
            stage,
            error,
            msg.topic(),
            msg.partition(),
            msg.offset(),
            Utc::now(),
        );
        let mut headers = OwnedHeaders::new_with_capacity(pairs.len());
        for (key, value) in &pairs {
            headers = headers.insert(Header {
                key,
                value: value.as_deref(),
            });
        }

        let mut record = FutureRecord::<[u8], [u8]>::to(&self.dlq_topic).headers(headers);
        if let Some(payload) = msg.payload() {
            record = record.payload(payload);
        }
        if let Some(key) = msg.key() {
            record = record.key(key);
        }

        match self.dlq.send(record, Timeout::After(DLQ_SEND_TIMEOUT)).await {
            Ok(_) => {
                tracing::debug!(stage = stage.as_str(), "message routed to DLQ");
            }
            Err((err, _)) => {
                // The original offset still commits; losing the DLQ copy is
                // the recorded tradeoff.
                tracing::error!(error = %err, "dlq write failed");
            }
        }
    }
}
