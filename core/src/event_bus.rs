//! Event bus abstraction for the rapid.
//!
//! This module provides the [`EventBus`] trait for publishing records to a topic and
//! subscribing to a stream of [`Delivery`] values. Solvers consume behov from the
//! rapid and publish their solutions back onto the same topic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Rapid topic   │
//! └────────┬────────┘
//!          │ subscribe
//!          ▼
//! ┌─────────────────┐
//! │    Consumer     │──── ack after processing
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Rivers      │──── filter + validate
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Solver      │──── publish(løsning)
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: A delivery is only committed once it has been
//!   acknowledged with [`Delivery::ack`]. Dropping it unacknowledged stops the
//!   consumer at that offset so the broker redelivers it after a restart.
//! - **Keyed records**: Publishing with a key keeps related messages on one partition.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (testing crate) - For tests (fast, synchronous)
//! - `RedpandaEventBus` (redpanda crate) - For production (Kafka-compatible)

use crate::message::Record;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A record received from a subscription.
///
/// Carries an acknowledgement handle. The transport waits for the ack before it
/// moves on and commits the offset.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the record was read from.
    pub topic: String,

    /// The received record.
    pub record: Record,

    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// Create a delivery that needs no acknowledgement.
    #[must_use]
    pub const fn new(topic: String, record: Record) -> Self {
        Self {
            topic,
            record,
            ack: None,
        }
    }

    /// Create a delivery paired with a receiver that resolves when it is acknowledged.
    ///
    /// The receiver errors if the delivery is dropped without [`Delivery::ack`].
    #[must_use]
    pub fn with_ack(topic: String, record: Record) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                topic,
                record,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Acknowledge the delivery so the transport may commit it.
    pub fn ack(mut self) {
        if let Some(tx) = self.ack.take() {
            // The transport may already be gone during shutdown.
            let _ = tx.send(());
        }
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn EventBus>` between the consumer and every
/// [`MessageContext`](crate::context::MessageContext).
pub trait EventBus: Send + Sync {
    /// Publish a record to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        record: &Record,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_resolves_receiver() {
        let (delivery, rx) = Delivery::with_ack("rapid".to_string(), Record::new(None, vec![]));
        delivery.ack();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropping_unacked_delivery_errors_receiver() {
        let (delivery, rx) = Delivery::with_ack("rapid".to_string(), Record::new(None, vec![]));
        drop(delivery);
        assert!(rx.await.is_err());
    }

    #[test]
    fn plain_delivery_ack_is_noop() {
        Delivery::new("rapid".to_string(), Record::new(None, vec![])).ack();
    }
}
