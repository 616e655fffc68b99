//! Request model for Kabal's `oversendelse` API.
//!
//! [`SubmitCase`] is what callers hand to the client. [`CaseSubmission`] is the
//! wire body, built from it with the fixed values of the dagpenger integration
//! filled in. `None` fields are left out of the JSON entirely.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Case system tag for dagpenger cases.
pub const FAGSYSTEM: &str = "DAGPENGER";

/// Benefit scheme tag for dagpenger.
pub const YTELSE: &str = "DAG_DAG";

/// Identifier type for natural persons.
pub const PERSON_ID_TYPE: &str = "PERSON";

/// Country used when an address omits one.
pub const DEFAULT_COUNTRY: &str = "NO";

/// Whether the case is a complaint or an appeal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseType {
    /// A complaint against a decision (default).
    #[default]
    Klage,
    /// An appeal of a complaint decision.
    Anke,
}

impl CaseType {
    /// Wire name of the case type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Klage => "KLAGE",
            Self::Anke => "ANKE",
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown case type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown case type '{0}', expected KLAGE or ANKE")]
pub struct UnknownCaseType(pub String);

impl FromStr for CaseType {
    type Err = UnknownCaseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KLAGE" => Ok(Self::Klage),
            "ANKE" => Ok(Self::Anke),
            other => Err(UnknownCaseType(other.to_string())),
        }
    }
}

/// A typed identifier, e.g. `{"type": "PERSON", "verdi": "11111111111"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonId {
    /// Identifier type.
    #[serde(rename = "type")]
    pub id_type: String,
    /// Identifier value.
    pub verdi: String,
}

impl PersonId {
    /// A national identity number of a natural person.
    #[must_use]
    pub fn person(ident: impl Into<String>) -> Self {
        Self {
            id_type: PERSON_ID_TYPE.to_string(),
            verdi: ident.into(),
        }
    }
}

/// The party a case concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyId {
    /// Identifier of the party.
    pub id: PersonId,
}

/// Reference to the originating case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fagsak {
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Originating case system.
    pub fagsystem: String,
}

/// A document attached to the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDocument {
    /// Document role, e.g. `BRUKERS_KLAGE`.
    #[serde(rename = "type")]
    pub document_type: String,
    /// Journal post id.
    pub journalpost_id: String,
}

impl AttachedDocument {
    /// Create a document reference.
    #[must_use]
    pub fn new(document_type: impl Into<String>, journalpost_id: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            journalpost_id: journalpost_id.into(),
        }
    }
}

/// Postal address of a representative.
///
/// Kabal spells the line fields `addresselinje`; the names are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// First address line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresselinje1: Option<String>,
    /// Second address line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresselinje2: Option<String>,
    /// Third address line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresselinje3: Option<String>,
    /// Postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postnummer: Option<String>,
    /// Postal town.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poststed: Option<String>,
    /// ISO country code.
    pub land: String,
}

/// An appointed representative (prosessfullmektig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representative {
    /// National identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<PersonId>,
    /// Name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navn: Option<String>,
    /// Postal address, when a country is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adresse: Option<Address>,
}

/// Everything needed to forward one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCase {
    /// Complaint or appeal.
    pub case_type: CaseType,
    /// Id of the complaint handling, sent as `kildeReferanse`.
    pub behandling_id: String,
    /// National identifier of the person the case concerns.
    pub ident: String,
    /// Case id in the dagpenger case system.
    pub fagsak_id: String,
    /// Unit that handled the complaint.
    pub behandlende_enhet: String,
    /// Legal basis codes.
    pub hjemler: Vec<String>,
    /// Attached documents, in order.
    pub documents: Vec<AttachedDocument>,
    /// Appointed representative.
    pub representative: Option<Representative>,
    /// Date the complaint was received.
    pub received_date: Option<NaiveDate>,
    /// Free-text comment to the appeals body.
    pub comment: Option<String>,
}

/// Wire body of `POST /api/oversendelse/v4/sak`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSubmission {
    #[serde(rename = "type")]
    case_type: CaseType,
    saken_gjelder: PartyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    prosess_fullmektig: Option<Representative>,
    fagsak: Fagsak,
    kilde_referanse: String,
    hjemler: Vec<String>,
    forrige_behandlende_enhet: String,
    tilknyttede_journalposter: Vec<AttachedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brukers_klage_mottatt_vedtaksinstans: Option<NaiveDate>,
    ytelse: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kommentar: Option<String>,
}

impl From<SubmitCase> for CaseSubmission {
    fn from(case: SubmitCase) -> Self {
        Self {
            case_type: case.case_type,
            saken_gjelder: PartyId {
                id: PersonId::person(case.ident),
            },
            prosess_fullmektig: case.representative,
            fagsak: Fagsak {
                fagsak_id: case.fagsak_id,
                fagsystem: FAGSYSTEM.to_string(),
            },
            kilde_referanse: case.behandling_id,
            hjemler: case.hjemler,
            forrige_behandlende_enhet: case.behandlende_enhet,
            tilknyttede_journalposter: case.documents,
            brukers_klage_mottatt_vedtaksinstans: case.received_date,
            ytelse: YTELSE,
            kommentar: case.comment,
        }
    }
}
