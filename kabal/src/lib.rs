//! # Kabal API Client
//!
//! Forwards dagpenger complaint cases to Kabal, the appeals body's case
//! system, via `POST /api/oversendelse/v4/sak`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dp_klageinstans_kabal::{CaseSubmitter, CaseType, KabalClient, StaticTokenProvider, SubmitCase};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = KabalClient::new(
//!         "http://kabal-api",
//!         Arc::new(StaticTokenProvider::new("token")),
//!     );
//!
//!     let outcome = client
//!         .submit(SubmitCase {
//!             case_type: CaseType::Klage,
//!             behandling_id: "B1".to_string(),
//!             ident: "11111111111".to_string(),
//!             fagsak_id: "F1".to_string(),
//!             behandlende_enhet: "4408".to_string(),
//!             hjemler: vec!["X_1".to_string()],
//!             documents: vec![],
//!             representative: None,
//!             received_date: None,
//!             comment: None,
//!         })
//!         .await;
//!
//!     println!("Delivered: {}", outcome.is_delivered());
//! }
//! ```
//!
//! ## Features
//!
//! - Fixed dagpenger values (`DAGPENGER`, `DAG_DAG`) filled in for every case
//! - Absent optional fields omitted from the JSON body
//! - Pluggable bearer tokens, with a caching client-credentials provider

pub mod client;
pub mod error;
pub mod token;
pub mod types;

// Re-export main types for convenience
pub use reqwest::StatusCode;
pub use client::{CaseSubmitter, DeliveryOutcome, KabalClient, OVERSENDELSE_PATH};
pub use error::{KabalError, TokenError};
pub use token::{ClientCredentials, ClientCredentialsTokenProvider, StaticTokenProvider, TokenProvider};
pub use types::{
    Address, AttachedDocument, CaseSubmission, CaseType, PersonId, Representative, SubmitCase,
    UnknownCaseType, DEFAULT_COUNTRY, FAGSYSTEM, YTELSE,
};
