//! Configuration management for dp-send-til-klageinstans.
//!
//! Loads configuration from environment variables, optionally seeded from a
//! `.env` file. Variables without a default must be set; everything is
//! validated before the service starts.

use dp_klageinstans_kabal::ClientCredentials;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(&'static str),
    /// Environment variable could not be parsed
    #[error("Failed to parse {key}: {reason}")]
    ParseError {
        /// Variable name
        key: &'static str,
        /// Parser message
        reason: String,
    },
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Rapid connection
    pub kafka: KafkaConfig,
    /// Kabal API
    pub kabal: KabalConfig,
    /// Behandlinger that are never forwarded
    pub skipped_behandlinger: HashSet<String>,
    /// Port of the health and metrics server
    pub http_port: u16,
    /// Log output format
    pub log_format: LogFormat,
}

/// Rapid connection configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated broker list
    pub brokers: String,
    /// Rapid topic
    pub rapid_topic: String,
    /// Consumer group id
    pub consumer_group_id: String,
    /// Offset reset policy for a new consumer group
    pub reset_policy: String,
    /// SSL client settings, when the cluster requires them
    pub ssl: Option<KafkaSsl>,
}

/// Kafka SSL file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSsl {
    /// CA certificate (PEM)
    pub ca_path: String,
    /// Client certificate (PEM)
    pub certificate_path: String,
    /// Client private key (PEM)
    pub private_key_path: String,
}

/// Kabal API configuration
#[derive(Debug, Clone)]
pub struct KabalConfig {
    /// Base URL, e.g. `http://kabal-api.klage`
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Client-credentials settings for the bearer token
    pub credentials: ClientCredentials,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a value does
    /// not parse, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal outside local development
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a value does
    /// not parse, or validation fails.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::EnvVarNotSet(key));

        let timeout_secs = match var("KABAL_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|e| ConfigError::ParseError {
                key: "KABAL_TIMEOUT_SECS",
                reason: e.to_string(),
            })?,
            None => 30,
        };
        let http_port = match var("HTTP_PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::ParseError {
                key: "HTTP_PORT",
                reason: e.to_string(),
            })?,
            None => 8080,
        };

        let ssl = match (
            var("KAFKA_CA_PATH"),
            var("KAFKA_CERTIFICATE_PATH"),
            var("KAFKA_PRIVATE_KEY_PATH"),
        ) {
            (Some(ca_path), Some(certificate_path), Some(private_key_path)) => Some(KafkaSsl {
                ca_path,
                certificate_path,
                private_key_path,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::ValidationError(
                    "KAFKA_CA_PATH, KAFKA_CERTIFICATE_PATH and KAFKA_PRIVATE_KEY_PATH must be set together"
                        .to_string(),
                ));
            }
        };

        let config = Self {
            kafka: KafkaConfig {
                brokers: required("KAFKA_BROKERS")?,
                rapid_topic: required("KAFKA_RAPID_TOPIC")?,
                consumer_group_id: var("KAFKA_CONSUMER_GROUP_ID")
                    .unwrap_or_else(|| "dp-send-til-klageinstans-v1".to_string()),
                reset_policy: var("KAFKA_RESET_POLICY")
                    .unwrap_or_else(|| "latest".to_string())
                    .to_lowercase(),
                ssl,
            },
            kabal: KabalConfig {
                base_url: required("KABAL_API_URL")?,
                timeout: Duration::from_secs(timeout_secs),
                credentials: ClientCredentials {
                    token_endpoint: required("AZURE_OPENID_CONFIG_TOKEN_ENDPOINT")?,
                    client_id: required("AZURE_APP_CLIENT_ID")?,
                    client_secret: required("AZURE_APP_CLIENT_SECRET")?,
                    scope: required("KABAL_API_SCOPE")?,
                },
            },
            skipped_behandlinger: parse_list(var("SKIPPED_BEHANDLINGER").as_deref()),
            http_port,
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.kafka.reset_policy.as_str(), "earliest" | "latest") {
            return Err(ConfigError::ValidationError(format!(
                "KAFKA_RESET_POLICY must be earliest or latest, was {}",
                self.kafka.reset_policy
            )));
        }

        if !(self.kabal.base_url.starts_with("http://") || self.kabal.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "KABAL_API_URL must be an http(s) URL, was {}",
                self.kabal.base_url
            )));
        }

        if self.kabal.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "KABAL_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(value: Option<&str>) -> HashSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
