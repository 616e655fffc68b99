//! Prometheus metrics for observability and monitoring.
//!
//! This module installs the global Prometheus recorder and describes the
//! metrics recorded across the workspace:
//! - Rapid consumption and publishing
//! - Message problems reported by rivers
//! - Behov outcomes
//! - Kabal request latency
//!
//! # Example
//!
//! ```rust,no_run
//! use dp_klageinstans_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Served by the health server at /metrics
//! let body = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Owns the Prometheus recorder handle.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsRecorder {
    /// Create a recorder that is not installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be configured.
    ///
    /// # Note
    ///
    /// Only one global recorder can exist per process. If one is already
    /// installed (e.g. in tests) this logs a warning and leaves the handle empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                register_metrics();
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
            }
            Err(_) => {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            }
        }
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this recorder was not installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Rapid
    describe_counter!(
        "rapid_messages_consumed_total",
        "Total number of messages consumed from the rapid"
    );
    describe_counter!(
        "rapid_messages_published_total",
        "Total number of messages published to the rapid"
    );
    describe_counter!(
        "rapid_consume_errors_total",
        "Total number of errors received from the rapid subscription"
    );
    describe_counter!(
        "message_problems_total",
        "Messages a river could not parse or validate, by river and kind"
    );

    // Behov
    describe_counter!(
        "behov_received_total",
        "Behov that passed validation and reached the solver"
    );
    describe_counter!(
        "behov_solved_total",
        "Behov forwarded to Kabal and answered with a løsning"
    );
    describe_counter!(
        "behov_skipped_total",
        "Behov ignored because the behandling is on the skip list"
    );
    describe_counter!(
        "behov_failed_total",
        "Behov that failed and stopped the consumer"
    );

    // Kabal
    describe_histogram!(
        "kabal_request_duration_seconds",
        "Time taken to forward a case to Kabal"
    );
}

/// Behov outcome recorder.
pub struct BehovMetrics;

impl BehovMetrics {
    /// Record a behov reaching the solver.
    pub fn record_received() {
        counter!("behov_received_total").increment(1);
    }

    /// Record a solved behov.
    pub fn record_solved() {
        counter!("behov_solved_total").increment(1);
    }

    /// Record a skipped behov.
    pub fn record_skipped() {
        counter!("behov_skipped_total").increment(1);
    }

    /// Record a failed behov, labelled by failure kind.
    pub fn record_failed(kind: &'static str) {
        counter!("behov_failed_total", "kind" => kind).increment(1);
    }
}
