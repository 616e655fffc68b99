//! A synchronous rapid for testing rivers and solvers.
//!
//! [`TestRapid`] runs each test message through every registered [`River`] in
//! turn, without a broker or a consumer task. Whatever the listeners publish is
//! captured and can be read back through a [`RapidInspector`].
//!
//! # Example
//!
//! ```ignore
//! let rapid = TestRapid::new();
//! rapid.register(river);
//! rapid.send_test_message(r#"{"@event_name":"behov"}"#).await?;
//!
//! let inspector = rapid.inspector();
//! assert_eq!(inspector.size(), 1);
//! ```

#![allow(clippy::missing_panics_doc)] // Panics only on malformed test data

use crate::mocks::InMemoryEventBus;
use dp_klageinstans_core::{
    EventBusError, JsonMessage, MessageContext, PacketError, Record, River, RiverOutcome,
};
use serde_json::Value;
use std::sync::Arc;

/// Topic name used by the test rapid.
pub const TEST_RAPID_TOPIC: &str = "test-rapid";

/// In-memory rapid with synchronous delivery.
#[derive(Debug)]
pub struct TestRapid {
    bus: InMemoryEventBus,
    rivers: Vec<River>,
}

impl Default for TestRapid {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRapid {
    /// Create a rapid with no rivers
    #[must_use]
    pub fn new() -> Self {
        Self {
            bus: InMemoryEventBus::new(),
            rivers: Vec::new(),
        }
    }

    /// Register a river. Rivers see messages in registration order.
    pub fn register(&mut self, river: River) {
        self.rivers.push(river);
    }

    /// Make publishing from listeners fail (or succeed again)
    pub fn fail_publishing(&self, fail: bool) {
        self.bus.fail_publishing(fail);
    }

    /// Send a raw message through every river.
    ///
    /// Returns each river's outcome in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first listener error. Rivers after the failing one do not see
    /// the message.
    pub async fn send_test_message(&self, message: &str) -> Result<Vec<RiverOutcome>, PacketError> {
        let context = MessageContext::new(Arc::new(self.bus.clone()), TEST_RAPID_TOPIC);
        let mut outcomes = Vec::with_capacity(self.rivers.len());
        for river in &self.rivers {
            outcomes.push(river.dispatch(message.as_bytes(), &context).await?);
        }
        Ok(outcomes)
    }

    /// Publish a record directly, as another service on the rapid would.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] while publishing is disabled.
    pub async fn publish(&self, key: &str, message: &str) -> Result<(), EventBusError> {
        use dp_klageinstans_core::EventBus;
        self.bus
            .publish(
                TEST_RAPID_TOPIC,
                &Record::new(Some(key.to_string()), message.as_bytes().to_vec()),
            )
            .await
    }

    /// Snapshot of everything published so far
    #[must_use]
    pub fn inspector(&self) -> RapidInspector {
        RapidInspector {
            records: self
                .bus
                .published()
                .into_iter()
                .map(|(_, record)| record)
                .collect(),
        }
    }

    /// Forget everything published so far
    pub fn reset(&mut self) {
        self.bus = InMemoryEventBus::new();
    }
}

/// Read-only view of the messages a [`TestRapid`] has captured.
#[derive(Debug, Clone)]
pub struct RapidInspector {
    records: Vec<Record>,
}

impl RapidInspector {
    /// Number of published messages
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was published
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Published message at `index`, parsed
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the payload is not a JSON object.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn message(&self, index: usize) -> JsonMessage {
        JsonMessage::parse(&self.records[index].payload).expect("published payload is a JSON object")
    }

    /// Field `key` of the published message at `index`, or `Value::Null`
    #[must_use]
    pub fn field(&self, index: usize, key: &str) -> Value {
        self.message(index).get(key).cloned().unwrap_or(Value::Null)
    }

    /// Key of the published message at `index`
    #[must_use]
    pub fn key(&self, index: usize) -> Option<&str> {
        self.records[index].key.as_deref()
    }
}
