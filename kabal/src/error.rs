//! Error types for the Kabal client

use thiserror::Error;

/// Errors that can occur when forwarding a case to Kabal
#[derive(Debug, Error)]
pub enum KabalError {
    /// No bearer token could be obtained
    #[error("Failed to obtain token: {0}")]
    Token(#[from] TokenError),

    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Kabal answered with a non-2xx status
    #[error("Kabal rejected the case (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: String,
    },
}

/// Errors from token providers
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Token endpoint could not be reached
    #[error("Token request failed: {0}")]
    RequestFailed(String),

    /// Token endpoint answered with an error
    #[error("Token endpoint error (status {status}): {message}")]
    Endpoint {
        /// HTTP status code
        status: u16,
        /// Error message from the endpoint
        message: String,
    },

    /// Token response could not be parsed
    #[error("Token response parsing failed: {0}")]
    ResponseParseFailed(String),
}
