//! # dp-klageinstans core
//!
//! Message, event bus and river abstractions for behov solvers on the rapid.
//!
//! ## Core Concepts
//!
//! - **Rapid**: A shared topic every service reads from and writes to
//! - **Behov**: A message asking for some capability, listed under `@behov`
//! - **River**: Preconditions and validations in front of a [`PacketListener`]
//! - **Løsning**: The answer a solver writes under `@løsning` before republishing
//!
//! ## Modules
//!
//! - [`message`]: [`JsonMessage`] and the raw [`Record`] carried by the bus
//! - [`event_bus`]: The [`EventBus`] trait and acknowledged [`Delivery`] values
//! - [`river`]: [`River`], [`Rules`], [`MessageProblems`] and [`PacketListener`]
//! - [`context`]: [`MessageContext`] for publishing from a listener

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod event_bus;
pub mod message;
pub mod river;

pub use context::MessageContext;
pub use event_bus::{Delivery, EventBus, EventBusError, EventStream};
pub use message::{JsonMessage, MessageError, Record, kind_of, scalar_text};
pub use river::{MessageProblems, PacketError, PacketListener, River, RiverOutcome, Rules};
