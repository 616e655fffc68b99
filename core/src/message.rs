//! JSON messages travelling on the rapid.
//!
//! Every message on the rapid is a JSON object. Solvers read a handful of named
//! fields, may add a few of their own (typically `@løsning`), and publish the
//! whole object back. Fields the solver does not know about are preserved
//! untouched, so a republished message is always the original plus whatever
//! the solver explicitly set.
//!
//! # Example
//!
//! ```
//! use dp_klageinstans_core::message::JsonMessage;
//!
//! let mut message = JsonMessage::parse(br#"{"@event_name": "behov", "ident": "11111111111"}"#)
//!     .expect("valid message");
//!
//! assert_eq!(message.text("ident"), Some("11111111111"));
//! message.set("@løsning", serde_json::json!({ "OversendelseKlageinstans": "OK" }));
//! assert!(message.to_json().contains("@løsning"));
//! ```

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Error types for message operations.
#[derive(Error, Debug)]
pub enum MessageError {
    /// The payload was not valid JSON.
    #[error("Failed to parse message: {0}")]
    ParseError(String),

    /// The payload was valid JSON but not an object.
    #[error("Message is not a JSON object (was {0})")]
    NotAnObject(&'static str),

    /// Failed to serialize the message back to JSON.
    #[error("Failed to serialize message: {0}")]
    SerializationError(String),
}

/// A raw record as it is carried by the event bus.
///
/// The key decides partitioning on the broker. Solvers publish their solutions
/// keyed by the subject's national identifier so every message about the same
/// person lands on the same partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Partition key, if any.
    pub key: Option<String>,

    /// JSON payload bytes.
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a new record.
    ///
    /// # Examples
    ///
    /// ```
    /// use dp_klageinstans_core::message::Record;
    ///
    /// let record = Record::new(Some("11111111111".to_string()), b"{}".to_vec());
    /// assert_eq!(record.key.as_deref(), Some("11111111111"));
    /// ```
    #[must_use]
    pub const fn new(key: Option<String>, payload: Vec<u8>) -> Self {
        Self { key, payload }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record {{ key: {}, size: {} bytes }}",
            self.key.as_deref().unwrap_or("<none>"),
            self.payload.len()
        )
    }
}

/// A parsed rapid message.
///
/// Wraps the top-level JSON object. A field holding JSON `null` is treated the
/// same as a missing field by every accessor.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonMessage {
    fields: Map<String, Value>,
}

impl JsonMessage {
    /// Parse a message from raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::ParseError`] if the bytes are not valid JSON and
    /// [`MessageError::NotAnObject`] if the top-level value is not an object.
    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| MessageError::ParseError(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build a message from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::NotAnObject`] if `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(MessageError::NotAnObject(kind_of(&other))),
        }
    }

    /// Get a field, treating `null` as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    /// Whether the field is present and not `null`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a field as text, if it holds a JSON string.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get a field as text, if it holds a JSON string or number.
    ///
    /// Numbers are rendered as written, so `12345` becomes `"12345"`.
    #[must_use]
    pub fn scalar_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_text)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Convert the message into a plain JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Render the message as compact JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Serializing a Map<String, Value> cannot fail.
        Value::Object(self.fields.clone()).to_string()
    }

    /// Render the message as a keyed [`Record`].
    #[must_use]
    pub fn to_record(&self, key: Option<String>) -> Record {
        Record::new(key, self.to_json().into_bytes())
    }
}

impl fmt::Display for JsonMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Text of a JSON string or number.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Human-readable JSON type of `value`, for error messages.
#[must_use]
pub const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
