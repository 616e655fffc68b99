//! # dp-send-til-klageinstans
//!
//! Solves the `OversendelseKlageinstans` behov: when a dagpenger complaint is
//! to be sent to the second-tier appeals body, the case is posted to Kabal and
//! the behov is answered on the rapid.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   behov    ┌──────────────────┐   POST /api/oversendelse/v4/sak
//! │    rapid     │ ─────────► │ KlageBehovHandler│ ─────────────────────────────► Kabal
//! │   (Kafka)    │ ◄───────── │  (River + decode)│
//! └──────────────┘  @løsning  └──────────────────┘
//! ```
//!
//! - [`behov`]: the solver and its filter contract
//! - [`decode`]: strict decoding of the behov into a Kabal case
//! - [`config`]: environment configuration
//! - [`server`]: `/isalive`, `/isready` and `/metrics`
//! - [`app`]: wiring and graceful shutdown

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod behov;
pub mod config;
pub mod decode;
pub mod server;

pub use app::Application;
pub use behov::{BEHOV, BehovError, KlageBehovHandler};
pub use config::{Config, ConfigError, LogFormat};
pub use decode::{DecodeError, decode_case};
pub use server::HealthState;
