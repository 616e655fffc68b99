//! # dp-klageinstans runtime
//!
//! Runs rivers against a live rapid.
//!
//! ## Core Components
//!
//! - **[`RapidsConsumer`]**: Subscribe-dispatch-ack loop with reconnection and
//!   graceful shutdown
//! - **[`metrics`]**: Prometheus recorder and metric descriptions
//!
//! ## Example
//!
//! ```ignore
//! use dp_klageinstans_runtime::RapidsConsumer;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let consumer = RapidsConsumer::builder()
//!     .topic("teamdagpenger.rapid.v1")
//!     .event_bus(event_bus)
//!     .river(river)
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! // ...
//! shutdown_tx.send(())?;
//! handle.await??;
//! ```

/// Rapid consumer loop
pub mod consumer;

/// Prometheus metrics for observability
pub mod metrics;

pub use consumer::{ConsumerError, DEFAULT_RETRY_DELAY, RapidsConsumer, RapidsConsumerBuilder};
pub use metrics::{BehovMetrics, MetricsError, MetricsRecorder};
