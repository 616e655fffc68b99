//! # dp-klageinstans testing
//!
//! Testing utilities for behov solvers on the rapid.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: Event bus double with ack tracking
//! - [`TestRapid`]: Runs rivers synchronously and captures what they publish
//! - [`MockSubmitter`]: Kabal double that records submitted cases
//! - [`helpers`]: Log setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use dp_klageinstans_testing::{MockSubmitter, TestRapid};
//!
//! #[tokio::test]
//! async fn solves_behov() {
//!     let submitter = MockSubmitter::delivering();
//!     let mut rapid = TestRapid::new();
//!     rapid.register(klage_river(Arc::new(submitter.clone()), HashSet::new()));
//!
//!     rapid.send_test_message(&behov_json()).await.unwrap();
//!
//!     assert_eq!(rapid.inspector().size(), 1);
//!     assert_eq!(submitter.call_count(), 1);
//! }
//! ```

pub mod mocks;
pub mod rapid;

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Route `tracing` output through the test harness.
    ///
    /// Honours `RUST_LOG` and defaults to `debug`. Safe to call from every test;
    /// only the first call installs a subscriber.
    pub fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_logging;
pub use mocks::{InMemoryEventBus, MockSubmitter};
pub use rapid::{RapidInspector, TEST_RAPID_TOPIC, TestRapid};
