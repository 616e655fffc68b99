//! The `OversendelseKlageinstans` behov solver.
//!
//! Forwards a complaint case to Kabal and answers the behov on the rapid:
//!
//! ```text
//! behov ──river──► skip list? ──no──► decode ──► Kabal ──2xx──► @løsning ──► publish(ident)
//!                      │                │          │
//!                     yes               ▼          ▼
//!                      ▼       BehovError::Decode  BehovError::Delivery
//!                   ignored
//! ```
//!
//! Every error is fatal for the consumer: nothing is published and the message
//! is left unacknowledged.

use crate::decode::{self, DecodeError, LEGACY_REPRESENTATIVE_FIELDS, REPRESENTATIVE_FIELD};
use async_trait::async_trait;
use dp_klageinstans_core::{JsonMessage, MessageContext, PacketError, PacketListener, River, Rules};
use dp_klageinstans_kabal::{CaseSubmitter, DeliveryOutcome, KabalError};
use dp_klageinstans_runtime::BehovMetrics;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Name of the behov this solver answers.
pub const BEHOV: &str = "OversendelseKlageinstans";

/// Fields every behov must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["ident", "behandlingId", "fagsakId", "behandlendeEnhet", "hjemler"];

/// Optional fields the solver reads.
pub const OPTIONAL_FIELDS: [&str; 5] = ["opprettet", "kommentar", "tilknyttedeJournalposter", "type", REPRESENTATIVE_FIELD];

/// Errors that make a behov fail.
#[derive(Debug, Error)]
pub enum BehovError {
    /// Kabal did not accept the case.
    #[error("Failed to forward klage to klageinstans for behandling {behandling_id}")]
    Delivery {
        /// The behandling that could not be forwarded
        behandling_id: String,
        /// Why the delivery failed
        #[source]
        source: KabalError,
    },

    /// A field had the wrong shape.
    #[error("Could not decode behov for behandling {behandling_id}: {source}")]
    Decode {
        /// The behandling the behov is about
        behandling_id: String,
        /// The decoding problem
        #[source]
        source: DecodeError,
    },
}

/// Forwards complaint cases to Kabal.
pub struct KlageBehovHandler {
    submitter: Arc<dyn CaseSubmitter>,
    skipped: HashSet<String>,
}

impl KlageBehovHandler {
    /// Create a handler that never forwards the behandlinger in `skipped`.
    #[must_use]
    pub fn new(submitter: Arc<dyn CaseSubmitter>, skipped: impl IntoIterator<Item = String>) -> Self {
        Self {
            submitter,
            skipped: skipped.into_iter().collect(),
        }
    }

    /// Filter contract of the solver.
    ///
    /// Returns `(preconditions, validations)`.
    #[must_use]
    pub fn rules() -> (Rules, Rules) {
        let preconditions = Rules::new()
            .require_value("@event_name", "behov")
            .require_all("@behov", &[BEHOV])
            .forbid("@løsning");
        let validations = Rules::new()
            .require_key(&REQUIRED_FIELDS)
            .interested_in(&OPTIONAL_FIELDS)
            .interested_in(&LEGACY_REPRESENTATIVE_FIELDS);
        (preconditions, validations)
    }

    /// Bind the handler to its river.
    #[must_use]
    pub fn into_river(self) -> River {
        let (preconditions, validations) = Self::rules();
        River::new(BEHOV, Arc::new(self))
            .precondition(preconditions)
            .validate(validations)
    }

    async fn solve(&self, mut packet: JsonMessage, context: &MessageContext, behandling_id: &str) -> Result<(), PacketError> {
        BehovMetrics::record_received();

        if self.skipped.contains(behandling_id) {
            tracing::info!("Skipping oversendelse of klagebehandling {behandling_id}");
            BehovMetrics::record_skipped();
            return Ok(());
        }

        let case = decode::decode_case(&packet).map_err(|source| {
            BehovMetrics::record_failed("decode");
            BehovError::Decode {
                behandling_id: behandling_id.to_string(),
                source,
            }
        })?;
        let ident = case.ident.clone();

        match self.submitter.submit(case).await {
            DeliveryOutcome::Delivered(_) => {
                tracing::info!("Klage forwarded to klageinstans for behandling {behandling_id}");
                packet.set("@løsning", json!({ BEHOV: "OK" }));
                context.publish(&ident, &packet).await?;
                BehovMetrics::record_solved();
                Ok(())
            }
            DeliveryOutcome::Failed(source) => {
                tracing::warn!("Failed to forward klage to klageinstans for behandling {behandling_id}");
                BehovMetrics::record_failed("delivery");
                Err(BehovError::Delivery {
                    behandling_id: behandling_id.to_string(),
                    source,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl PacketListener for KlageBehovHandler {
    async fn on_packet(&self, packet: JsonMessage, context: &MessageContext) -> Result<(), PacketError> {
        let behandling_id = packet.scalar_text("behandlingId").unwrap_or_default();
        let span = tracing::info_span!("behov", behandling_id = %behandling_id);
        self.solve(packet, context, &behandling_id).instrument(span).await
    }
}

impl std::fmt::Debug for KlageBehovHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlageBehovHandler")
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
