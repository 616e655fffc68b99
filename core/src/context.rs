//! Publishing context handed to packet listeners.

use crate::event_bus::{EventBus, EventBusError};
use crate::message::JsonMessage;
use std::sync::Arc;

/// Lets a listener publish messages back onto the topic it consumed from.
#[derive(Clone)]
pub struct MessageContext {
    event_bus: Arc<dyn EventBus>,
    topic: String,
}

impl MessageContext {
    /// Create a context publishing to `topic`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            event_bus,
            topic: topic.into(),
        }
    }

    /// Topic this context publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `message` keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the underlying bus rejects the record.
    pub async fn publish(&self, key: &str, message: &JsonMessage) -> Result<(), EventBusError> {
        let record = message.to_record(Some(key.to_string()));
        self.event_bus.publish(&self.topic, &record).await?;
        metrics::counter!("rapid_messages_published_total").increment(1);
        tracing::debug!(topic = %self.topic, key = %key, "Published message");
        Ok(())
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
