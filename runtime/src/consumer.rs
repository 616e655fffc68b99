//! Rapid consumer with automatic reconnection.
//!
//! [`RapidsConsumer`] subscribes to the rapid topic, runs every delivery through
//! the registered [`River`]s in order and acknowledges it once all of them are
//! done. It owns the subscribe-process-reconnect loop so solvers only implement
//! [`PacketListener`](dp_klageinstans_core::PacketListener).
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe (retry after delay on failure)
//!     loop {
//!         next delivery
//!             - dispatch to every river
//!             - listener error → stop, delivery left unacknowledged
//!             - otherwise ack
//!         shutdown signal → return
//!     }
//!     stream ended → reconnect after delay
//! }
//! ```
//!
//! Validation problems and unparseable payloads are reported by the river and
//! acknowledged; only listener errors stop the consumer. The unacknowledged
//! delivery is never committed, so the broker hands it out again after a
//! restart.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = RapidsConsumer::builder()
//!     .name("dp-send-til-klageinstans")
//!     .topic("teamdagpenger.rapid.v1")
//!     .event_bus(event_bus)
//!     .river(river)
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let ready = consumer.ready_flag();
//! let handle = consumer.spawn();
//! ```

use dp_klageinstans_core::{
    Delivery, EventBus, EventStream, MessageContext, PacketError, River, RiverOutcome,
};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Default delay before resubscribing.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors that stop a [`RapidsConsumer`].
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// A listener failed. The delivery was not acknowledged.
    #[error("Fatal error in river '{river}' on topic '{topic}': {source}")]
    Fatal {
        /// Topic the delivery came from
        topic: String,
        /// River whose listener failed
        river: String,
        /// The listener's error
        #[source]
        source: PacketError,
    },

    /// The consumer was built without a required part
    #[error("Consumer is missing required setting: {0}")]
    MissingSetting(&'static str),
}

/// Consumes the rapid and feeds deliveries to rivers.
///
/// # Lifecycle
///
/// 1. Created via [`builder()`](Self::builder)
/// 2. Spawned as background task via [`spawn()`](Self::spawn)
/// 3. Runs until:
///    - Shutdown signal received (`Ok(())`)
///    - A listener fails ([`ConsumerError::Fatal`])
pub struct RapidsConsumer {
    name: String,
    topic: String,
    event_bus: Arc<dyn EventBus>,
    rivers: Vec<River>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    ready: Arc<AtomicBool>,
}

impl RapidsConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> RapidsConsumerBuilder {
        RapidsConsumerBuilder::default()
    }

    /// Flag that is `true` while the consumer holds a live subscription.
    #[must_use]
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<Result<(), ConsumerError>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run the consumer on the current task.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Fatal`] when a listener fails.
    pub async fn run(&mut self) -> Result<(), ConsumerError> {
        info!(consumer = %self.name, topic = %self.topic, rivers = self.rivers.len(), "Rapid consumer started");

        let result = self.subscribe_loop().await;
        self.ready.store(false, Ordering::SeqCst);

        match &result {
            Ok(()) => info!(consumer = %self.name, "Rapid consumer stopped"),
            Err(e) => error!(consumer = %self.name, error = %e, "Rapid consumer stopped on fatal error"),
        }
        result
    }

    async fn subscribe_loop(&mut self) -> Result<(), ConsumerError> {
        loop {
            let event_bus = Arc::clone(&self.event_bus);
            let topics = [self.topic.as_str()];

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Rapid consumer received shutdown signal");
                    return Ok(());
                }
                subscribe_result = event_bus.subscribe(&topics) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, topic = %self.topic, "Subscribed to rapid");
                            self.ready.store(true, Ordering::SeqCst);

                            let finished = self.process_stream(&mut stream).await;
                            self.ready.store(false, Ordering::SeqCst);
                            if finished? {
                                return Ok(());
                            }

                            warn!(consumer = %self.name, "Rapid stream ended, reconnecting in {:?}", self.retry_delay);
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Failed to subscribe to rapid, retrying in {:?}",
                                self.retry_delay
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Rapid consumer received shutdown signal while waiting to reconnect");
                    return Ok(());
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    /// Process deliveries until the stream ends or shutdown is signalled.
    ///
    /// Returns `Ok(true)` on shutdown and `Ok(false)` when the stream ended.
    async fn process_stream(&mut self, stream: &mut EventStream) -> Result<bool, ConsumerError> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Rapid consumer received shutdown signal during processing");
                    return Ok(true);
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(delivery)) => self.process(delivery).await?,
                        Some(Err(e)) => {
                            metrics::counter!("rapid_consume_errors_total").increment(1);
                            error!(consumer = %self.name, error = %e, "Error receiving message from rapid");
                        }
                        None => return Ok(false),
                    }
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery) -> Result<(), ConsumerError> {
        metrics::counter!("rapid_messages_consumed_total").increment(1);
        let context = MessageContext::new(Arc::clone(&self.event_bus), delivery.topic.clone());

        for river in &self.rivers {
            match river.dispatch(&delivery.record.payload, &context).await {
                Ok(RiverOutcome::Handled) => {
                    debug!(consumer = %self.name, river = %river.name(), "Message handled");
                }
                Ok(_) => {}
                Err(source) => {
                    return Err(ConsumerError::Fatal {
                        topic: delivery.topic,
                        river: river.name().to_string(),
                        source,
                    });
                }
            }
        }

        delivery.ack();
        Ok(())
    }
}

impl std::fmt::Debug for RapidsConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapidsConsumer")
            .field("name", &self.name)
            .field("topic", &self.topic)
            .field("rivers", &self.rivers)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RapidsConsumer`].
#[derive(Default)]
pub struct RapidsConsumerBuilder {
    name: Option<String>,
    topic: Option<String>,
    event_bus: Option<Arc<dyn EventBus>>,
    rivers: Vec<River>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl RapidsConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the rapid topic to consume and publish to.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a river. Rivers see each delivery in registration order.
    #[must_use]
    pub fn river(mut self, river: River) -> Self {
        self.rivers.push(river);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set custom retry delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::MissingSetting`] if topic, event bus or
    /// shutdown receiver is not set. The name defaults to the topic.
    pub fn build(self) -> Result<RapidsConsumer, ConsumerError> {
        let topic = self.topic.ok_or(ConsumerError::MissingSetting("topic"))?;
        Ok(RapidsConsumer {
            name: self.name.unwrap_or_else(|| topic.clone()),
            event_bus: self
                .event_bus
                .ok_or(ConsumerError::MissingSetting("event_bus"))?,
            shutdown: self
                .shutdown
                .ok_or(ConsumerError::MissingSetting("shutdown"))?,
            rivers: self.rivers,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            ready: Arc::new(AtomicBool::new(false)),
            topic,
        })
    }
}
