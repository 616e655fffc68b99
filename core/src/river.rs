//! Rivers: filter contracts in front of packet listeners.
//!
//! A [`River`] pairs a [`PacketListener`] with two rule sets:
//!
//! - **Preconditions** decide whether a message is meant for this listener at
//!   all. A miss is normal traffic on a shared rapid and is only logged at
//!   `debug`.
//! - **Validations** describe what a matching message must contain. A miss
//!   produces [`MessageProblems`] which are reported through
//!   [`PacketListener::on_error`]; the listener body never runs.
//!
//! ```text
//! payload ──parse──► JsonMessage ──preconditions──► validations ──► on_packet
//!    │                                │                  │
//!    ▼                                ▼                  ▼
//! on_severe                 on_precondition_error     on_error
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let river = River::new("my-solver", listener)
//!     .precondition(
//!         Rules::new()
//!             .require_value("@event_name", "behov")
//!             .require_all("@behov", &["MyNeed"])
//!             .forbid("@løsning"),
//!     )
//!     .validate(Rules::new().require_key(&["ident"]));
//! ```

use crate::context::MessageContext;
use crate::message::{JsonMessage, kind_of};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Error type returned by listeners.
pub type PacketError = Box<dyn std::error::Error + Send + Sync>;

/// A single check against a message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Check {
    RequireValue { key: String, value: String },
    RequireAll { key: String, values: Vec<String> },
    Forbid { key: String },
    RequireKey { key: String },
    InterestedIn { key: String },
}

/// An ordered set of checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules {
    checks: Vec<Check>,
}

impl Rules {
    /// Create an empty rule set.
    #[must_use]
    pub const fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Require `key` to hold exactly the string `value`.
    #[must_use]
    pub fn require_value(mut self, key: &str, value: &str) -> Self {
        self.checks.push(Check::RequireValue {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Require `key` to be an array containing every one of `values`.
    #[must_use]
    pub fn require_all(mut self, key: &str, values: &[&str]) -> Self {
        self.checks.push(Check::RequireAll {
            key: key.to_string(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
        });
        self
    }

    /// Require `key` to be absent (or `null`).
    #[must_use]
    pub fn forbid(mut self, key: &str) -> Self {
        self.checks.push(Check::Forbid {
            key: key.to_string(),
        });
        self
    }

    /// Require every key in `keys` to be present and not `null`.
    #[must_use]
    pub fn require_key(mut self, keys: &[&str]) -> Self {
        self.checks.extend(keys.iter().map(|key| Check::RequireKey {
            key: (*key).to_string(),
        }));
        self
    }

    /// Declare optional keys the listener reads. Never fails a message.
    #[must_use]
    pub fn interested_in(mut self, keys: &[&str]) -> Self {
        self.checks.extend(keys.iter().map(|key| Check::InterestedIn {
            key: (*key).to_string(),
        }));
        self
    }

    /// Append all checks from `other`.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.checks.extend(other.checks);
        self
    }

    /// Keys this rule set requires to be present.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().filter_map(|check| match check {
            Check::RequireKey { key } => Some(key.as_str()),
            _ => None,
        })
    }

    /// Keys this rule set declares as optional.
    pub fn optional_keys(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().filter_map(|check| match check {
            Check::InterestedIn { key } => Some(key.as_str()),
            _ => None,
        })
    }

    /// Run every check, recording failures in `problems`.
    pub fn apply(&self, message: &JsonMessage, problems: &mut MessageProblems) {
        for check in &self.checks {
            match check {
                Check::RequireValue { key, value } => match message.get(key) {
                    Some(Value::String(actual)) if actual == value => {}
                    Some(other) => problems.error(format!("Required {key} is not {value}, was {other}")),
                    None => problems.error(format!("Missing required key {key}")),
                },
                Check::RequireAll { key, values } => match message.get(key) {
                    Some(Value::Array(items)) => {
                        let missing: Vec<&str> = values
                            .iter()
                            .filter(|wanted| !items.iter().any(|item| item.as_str() == Some(wanted.as_str())))
                            .map(String::as_str)
                            .collect();
                        if !missing.is_empty() {
                            problems.error(format!("Required {key} does not contain {missing:?}"));
                        }
                    }
                    Some(other) => problems.error(format!(
                        "Required {key} must be an array, was {}",
                        kind_of(other)
                    )),
                    None => problems.error(format!("Missing required key {key}")),
                },
                Check::Forbid { key } => {
                    if message.has(key) {
                        problems.error(format!("Message has forbidden key {key}"));
                    }
                }
                Check::RequireKey { key } => {
                    if !message.has(key) {
                        problems.error(format!("Missing required key {key}"));
                    }
                }
                Check::InterestedIn { .. } => {}
            }
        }
    }
}

/// Problems found while checking a message against a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProblems {
    original: String,
    errors: Vec<String>,
}

impl MessageProblems {
    /// Start an empty report for the given original payload.
    #[must_use]
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            errors: Vec::new(),
        }
    }

    /// Record an error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Whether any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All recorded errors, in check order.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// The payload the problems refer to.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for MessageProblems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Message has {} error(s):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "\t- {error}")?;
        }
        write!(f, "Original message: {}", self.original)
    }
}

/// Receives the messages a [`River`] lets through.
///
/// Only [`on_packet`](PacketListener::on_packet) is required. The reporting hooks
/// log by default.
#[async_trait]
pub trait PacketListener: Send + Sync + 'static {
    /// Handle a message that passed preconditions and validations.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal for the message: it is reported through
    /// [`on_severe`](PacketListener::on_severe) and propagated to the consumer,
    /// which stops without acknowledging.
    async fn on_packet(&self, packet: JsonMessage, context: &MessageContext) -> Result<(), PacketError>;

    /// A matching message failed validation.
    fn on_error(&self, problems: &MessageProblems) {
        tracing::error!(errors = ?problems.errors(), "Could not understand message\n{problems}");
    }

    /// A message could not be parsed, or the listener failed.
    fn on_severe(&self, error: &(dyn std::error::Error + Send + Sync)) {
        tracing::error!(error = %error, "Severe error while handling message");
    }

    /// A message was not meant for this listener.
    fn on_precondition_error(&self, problems: &MessageProblems) {
        tracing::debug!(errors = ?problems.errors(), "Message did not match preconditions");
    }
}

/// What a river did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiverOutcome {
    /// The listener handled the message.
    Handled,
    /// Preconditions did not match.
    Skipped,
    /// Preconditions matched but validation failed.
    Invalid,
    /// The payload was not a JSON object.
    Unparseable,
}

/// A filter contract bound to a listener.
pub struct River {
    name: String,
    preconditions: Rules,
    validations: Rules,
    listener: Arc<dyn PacketListener>,
}

impl River {
    /// Create a river with no rules.
    #[must_use]
    pub fn new(name: impl Into<String>, listener: Arc<dyn PacketListener>) -> Self {
        Self {
            name: name.into(),
            preconditions: Rules::new(),
            validations: Rules::new(),
            listener,
        }
    }

    /// Add precondition rules.
    #[must_use]
    pub fn precondition(mut self, rules: Rules) -> Self {
        self.preconditions = self.preconditions.merge(rules);
        self
    }

    /// Add validation rules.
    #[must_use]
    pub fn validate(mut self, rules: Rules) -> Self {
        self.validations = self.validations.merge(rules);
        self
    }

    /// River name, used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `payload` through the river.
    ///
    /// # Errors
    ///
    /// Returns the listener's error if [`PacketListener::on_packet`] fails. Parse,
    /// precondition and validation failures are reported through the listener
    /// hooks and returned as a [`RiverOutcome`] instead.
    pub async fn dispatch(
        &self,
        payload: &[u8],
        context: &MessageContext,
    ) -> Result<RiverOutcome, PacketError> {
        let message = match JsonMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                self.listener.on_severe(&e);
                metrics::counter!("message_problems_total", "river" => self.name.clone(), "kind" => "severe")
                    .increment(1);
                return Ok(RiverOutcome::Unparseable);
            }
        };

        let original = String::from_utf8_lossy(payload);

        let mut problems = MessageProblems::new(original.as_ref());
        self.preconditions.apply(&message, &mut problems);
        if problems.has_errors() {
            self.listener.on_precondition_error(&problems);
            return Ok(RiverOutcome::Skipped);
        }

        let mut problems = MessageProblems::new(original.as_ref());
        self.validations.apply(&message, &mut problems);
        if problems.has_errors() {
            self.listener.on_error(&problems);
            metrics::counter!("message_problems_total", "river" => self.name.clone(), "kind" => "validation")
                .increment(1);
            return Ok(RiverOutcome::Invalid);
        }

        match self.listener.on_packet(message, context).await {
            Ok(()) => Ok(RiverOutcome::Handled),
            Err(e) => {
                self.listener.on_severe(e.as_ref());
                Err(e)
            }
        }
    }
}

impl fmt::Debug for River {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("River")
            .field("name", &self.name)
            .field("preconditions", &self.preconditions)
            .field("validations", &self.validations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: Tests fail on poisoned locks or unexpected errors
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, EventBusError, EventStream};
    use crate::message::Record;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    #[derive(Default)]
    struct NullBus;

    impl EventBus for NullBus {
        fn publish(
            &self,
            _topic: &str,
            _record: &Record,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn subscribe(
            &self,
            topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
            let topics = topics.iter().map(|t| (*t).to_string()).collect();
            Box::pin(async move {
                Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "not supported".to_string(),
                })
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        packets: Mutex<Vec<JsonMessage>>,
        errors: Mutex<Vec<MessageProblems>>,
        severe: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PacketListener for Recorder {
        async fn on_packet(&self, packet: JsonMessage, _context: &MessageContext) -> Result<(), PacketError> {
            self.packets.lock().unwrap().push(packet);
            if self.fail {
                return Err("boom".into());
            }
            Ok(())
        }

        fn on_error(&self, problems: &MessageProblems) {
            self.errors.lock().unwrap().push(problems.clone());
        }

        fn on_severe(&self, error: &(dyn std::error::Error + Send + Sync)) {
            self.severe.lock().unwrap().push(error.to_string());
        }
    }

    fn context() -> MessageContext {
        MessageContext::new(Arc::new(NullBus), "rapid")
    }

    fn river(listener: Arc<Recorder>) -> River {
        River::new("test", listener)
            .precondition(
                Rules::new()
                    .require_value("@event_name", "behov")
                    .require_all("@behov", &["Need"])
                    .forbid("@løsning"),
            )
            .validate(Rules::new().require_key(&["ident", "hjemler"]).interested_in(&["kommentar"]))
    }

    #[tokio::test]
    async fn matching_message_reaches_listener() {
        let recorder = Arc::new(Recorder::default());
        let outcome = river(Arc::clone(&recorder))
            .dispatch(
                br#"{"@event_name":"behov","@behov":["Other","Need"],"ident":"1","hjemler":[]}"#,
                &context(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RiverOutcome::Handled);
        assert_eq!(recorder.packets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn precondition_miss_is_skipped_quietly() {
        let recorder = Arc::new(Recorder::default());
        let river = river(Arc::clone(&recorder));

        for payload in [
            br#"{"@event_name":"other","@behov":["Need"],"ident":"1","hjemler":[]}"#.as_slice(),
            br#"{"@event_name":"behov","@behov":["Other"],"ident":"1","hjemler":[]}"#.as_slice(),
            r#"{"@event_name":"behov","@behov":["Need"],"@løsning":{},"ident":"1","hjemler":[]}"#.as_bytes(),
        ] {
            assert_eq!(river.dispatch(payload, &context()).await.unwrap(), RiverOutcome::Skipped);
        }

        assert!(recorder.packets.lock().unwrap().is_empty());
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_key_reports_problems() {
        let recorder = Arc::new(Recorder::default());
        let outcome = river(Arc::clone(&recorder))
            .dispatch(br#"{"@event_name":"behov","@behov":["Need"],"ident":null}"#, &context())
            .await
            .unwrap();

        assert_eq!(outcome, RiverOutcome::Invalid);
        assert!(recorder.packets.lock().unwrap().is_empty());
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(
            errors[0].errors(),
            ["Missing required key ident", "Missing required key hjemler"]
        );
    }

    #[tokio::test]
    async fn unparseable_payload_is_severe_but_not_fatal() {
        let recorder = Arc::new(Recorder::default());
        let outcome = river(Arc::clone(&recorder)).dispatch(b"{not json", &context()).await.unwrap();

        assert_eq!(outcome, RiverOutcome::Unparseable);
        assert_eq!(recorder.severe.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listener_error_is_reported_and_propagated() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let result = river(Arc::clone(&recorder))
            .dispatch(
                br#"{"@event_name":"behov","@behov":["Need"],"ident":"1","hjemler":[]}"#,
                &context(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(recorder.severe.lock().unwrap().as_slice(), ["boom"]);
    }

    #[test]
    fn rules_expose_declared_keys() {
        let rules = Rules::new().require_key(&["a", "b"]).interested_in(&["c"]);
        assert_eq!(rules.required_keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(rules.optional_keys().collect::<Vec<_>>(), ["c"]);
    }

    #[test]
    fn problems_display_lists_errors_and_original() {
        let mut problems = MessageProblems::new("{}");
        problems.error("Missing required key ident");
        let display = problems.to_string();
        assert!(display.contains("1 error(s)"));
        assert!(display.contains("Missing required key ident"));
        assert!(display.contains("Original message: {}"));
    }
}
