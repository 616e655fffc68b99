//! Kafka-compatible event bus for the rapid.
//!
//! This crate provides a Redpanda/Kafka-based implementation of the [`EventBus`]
//! trait from `dp-klageinstans-core`, built on rdkafka.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Each record is handed out as a [`Delivery`] and the consumer task waits
//!   for its acknowledgement before reading on
//! - The offset is committed only AFTER the delivery is acknowledged
//! - A delivery dropped without ack stops the consumer task without committing,
//!   so the record is redelivered to the group after a restart
//! - Ordering is guaranteed within a partition; publish keys decide the partition
//!
//! **Configuration options**:
//! - `consumer_group`: Explicit consumer group for load balancing
//! - `auto_offset_reset`: Where to start reading (default: "latest")
//! - `client_config`: Extra librdkafka settings, e.g. SSL
//!
//! # Example
//!
//! ```no_run
//! use dp_klageinstans_redpanda::RedpandaEventBus;
//! use dp_klageinstans_core::{EventBus, Record};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("dp-send-til-klageinstans")
//!     .build()?;
//!
//! // Publish a keyed record
//! let record = Record::new(Some("11111111111".to_string()), br#"{"@event_name":"ping"}"#.to_vec());
//! event_bus.publish("teamdagpenger.rapid.v1", &record).await?;
//!
//! // Subscribe and acknowledge
//! let mut stream = event_bus.subscribe(&["teamdagpenger.rapid.v1"]).await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("Received: {}", delivery.record);
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use dp_klageinstans_core::{Delivery, EventBus, EventBusError, EventStream, Record};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Redpanda event bus implementation.
///
/// Records are published as-is: the record key becomes the Kafka key and the
/// JSON payload the Kafka value.
///
/// # Example
///
/// ```no_run
/// use dp_klageinstans_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Basic configuration
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// // Custom configuration
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .auto_offset_reset("earliest")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing records
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Extra settings applied to producer and consumers
    client_config: Vec<(String, String)>,
}

impl RedpandaEventBus {
    /// Create a new event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_group_id(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            // Sort topics for deterministic consumer group naming
            let mut sorted_topics = topics.to_vec();
            sorted_topics.sort();
            format!("dp-klageinstans-{}", sorted_topics.join("-"))
        })
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("consumer_group", &self.consumer_group)
            .field("auto_offset_reset", &self.auto_offset_reset)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    client_config: Vec<(String, String)>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec ("none", "gzip", "snappy", "lz4", "zstd").
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the consumer group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// - `"earliest"`: Start from the beginning of the topic
    /// - `"latest"`: Start from the end (only new records)
    /// - `"error"`: Fail if no offset exists
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Add a raw librdkafka setting for both producer and consumers.
    ///
    /// ```no_run
    /// use dp_klageinstans_redpanda::RedpandaEventBus;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let event_bus = RedpandaEventBus::builder()
    ///     .brokers("broker:9093")
    ///     .client_config("security.protocol", "ssl")
    ///     .client_config("ssl.ca.location", "/var/run/secrets/ca.pem")
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn client_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_config.push((key.into(), value.into()));
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression);
        for (key, value) in &self.client_config {
            producer_config.set(key, value);
        }

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = acks,
            compression = compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            auto_offset_reset,
            client_config: self.client_config,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &Record,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let record = record.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let mut kafka_record = FutureRecord::<str, [u8]>::to(&topic).payload(record.payload.as_slice());
            if let Some(key) = record.key.as_deref() {
                kafka_record = kafka_record.key(key);
            }

            match self.producer.send(kafka_record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        key = record.key.as_deref().unwrap_or_default(),
                        "Record published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish record"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    #[allow(clippy::too_many_lines)] // Complexity required for at-least-once delivery with manual commits
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let consumer_group_id = self.consumer_group_id(&topics);

            let mut consumer_config = ClientConfig::new();
            consumer_config
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false") // Manual commit for at-least-once
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false");
            for (key, value) in &self.client_config {
                consumer_config.set(key, value);
            }

            let consumer: StreamConsumer =
                consumer_config
                    .create()
                    .map_err(|e| EventBusError::SubscriptionFailed {
                        topics: topics.clone(),
                        reason: format!("Failed to create consumer: {e}"),
                    })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                auto_offset_reset = %self.auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            // One delivery in flight at a time: the task waits for each ack.
            let (tx, rx) = tokio::sync::mpsc::channel(1);

            // Spawn a task that owns the consumer and forwards deliveries
            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let Some(payload) = message.payload() else {
                                // Tombstones carry nothing for the rapid
                                tracing::debug!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "Skipping record without payload"
                                );
                                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                    tracing::warn!(error = %e, "Failed to commit record without payload");
                                }
                                continue;
                            };

                            let key = message
                                .key()
                                .map(|key| String::from_utf8_lossy(key).into_owned());
                            let record = Record::new(key, payload.to_vec());
                            tracing::trace!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                "Received record"
                            );

                            let (delivery, ack) = Delivery::with_ack(message.topic().to_string(), record);
                            if tx.send(Ok(delivery)).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break; // Receiver dropped, exit WITHOUT committing
                            }

                            if ack.await.is_err() {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "Delivery dropped without ack, stopping without commit"
                                );
                                break;
                            }

                            // Commit offset AFTER the record has been processed
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (record may be redelivered)"
                                );
                            }
                        }
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break; // Receiver dropped
                            }
                        }
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if the producer cannot be created
    fn consumer_group_defaults_to_sorted_topics() {
        // Producer creation does not contact the broker
        let bus = RedpandaEventBus::new("localhost:9092").expect("producer builds");
        let topics = vec!["b".to_string(), "a".to_string()];
        assert_eq!(bus.consumer_group_id(&topics), "dp-klageinstans-a-b");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn explicit_consumer_group_wins() {
        let bus = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("dp-send-til-klageinstans")
            .build()
            .expect("producer builds");
        assert_eq!(
            bus.consumer_group_id(&["rapid".to_string()]),
            "dp-send-til-klageinstans"
        );
    }
}
