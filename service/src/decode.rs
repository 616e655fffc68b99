//! Decoding a behov message into a [`SubmitCase`].
//!
//! Required fields are checked for presence by the river; this module checks
//! their shape. Optional structures are decoded strictly: a malformed document
//! entry or representative object is a [`DecodeError`] naming the field path,
//! never silently dropped.
//!
//! The representative arrives in one of two shapes:
//!
//! - nested `prosessFullmektig` object (canonical)
//! - flat `prosessfullmektig*` fields (legacy), converted by
//!   [`LegacyRepresentativeFields::into_canonical`]
//!
//! When both are present the nested object wins.

use chrono::NaiveDate;
use dp_klageinstans_core::{JsonMessage, kind_of, scalar_text};
use dp_klageinstans_kabal::{
    Address, AttachedDocument, CaseType, DEFAULT_COUNTRY, PersonId, Representative, SubmitCase,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Nested representative field.
pub const REPRESENTATIVE_FIELD: &str = "prosessFullmektig";

/// Flat legacy representative fields.
pub const LEGACY_REPRESENTATIVE_FIELDS: [&str; 8] = [
    "prosessfullmektigNavn",
    "prosessfullmektigIdent",
    "prosessfullmektigAdresselinje1",
    "prosessfullmektigAdresselinje2",
    "prosessfullmektigAdresselinje3",
    "prosessfullmektigPostnummer",
    "prosessfullmektigPoststed",
    "prosessfullmektigLand",
];

/// A field had the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Field is missing.
    #[error("{path}: missing required field")]
    Missing {
        /// Path of the field
        path: String,
    },

    /// Field holds the wrong JSON type.
    #[error("{path}: expected {expected}, was {actual}")]
    UnexpectedType {
        /// Path of the field
        path: String,
        /// Expected JSON type
        expected: &'static str,
        /// Actual JSON type
        actual: &'static str,
    },

    /// Field holds a value outside its domain.
    #[error("{path}: invalid value '{value}': {reason}")]
    InvalidValue {
        /// Path of the field
        path: String,
        /// The offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// Nested object could not be decoded.
    #[error("{path}: {reason}")]
    Malformed {
        /// Path of the field
        path: String,
        /// Decoder message
        reason: String,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn required_text(message: &JsonMessage, key: &str) -> Result<String, DecodeError> {
    let value = message.get(key).ok_or_else(|| DecodeError::Missing {
        path: key.to_string(),
    })?;
    scalar_text(value).ok_or_else(|| DecodeError::UnexpectedType {
        path: key.to_string(),
        expected: "a string",
        actual: kind_of(value),
    })
}

fn required_texts(message: &JsonMessage, key: &str) -> Result<Vec<String>, DecodeError> {
    let value = message.get(key).ok_or_else(|| DecodeError::Missing {
        path: key.to_string(),
    })?;
    let Value::Array(items) = value else {
        return Err(DecodeError::UnexpectedType {
            path: key.to_string(),
            expected: "an array",
            actual: kind_of(value),
        });
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            scalar_text(item).ok_or_else(|| DecodeError::UnexpectedType {
                path: format!("{key}[{i}]"),
                expected: "a string",
                actual: kind_of(item),
            })
        })
        .collect()
}

/// Decode the whole case.
///
/// # Errors
///
/// Returns the first [`DecodeError`] found.
pub fn decode_case(message: &JsonMessage) -> Result<SubmitCase, DecodeError> {
    Ok(SubmitCase {
        case_type: case_type(message)?,
        behandling_id: required_text(message, "behandlingId")?,
        ident: required_text(message, "ident")?,
        fagsak_id: required_text(message, "fagsakId")?,
        behandlende_enhet: required_text(message, "behandlendeEnhet")?,
        hjemler: required_texts(message, "hjemler")?,
        documents: documents(message)?,
        representative: representative(message)?,
        received_date: received_date(message)?,
        comment: message.text("kommentar").map(str::to_string),
    })
}

/// Complaint or appeal, from `type`. Defaults to [`CaseType::Klage`].
///
/// # Errors
///
/// Returns [`DecodeError`] if `type` is not `KLAGE` or `ANKE`.
pub fn case_type(message: &JsonMessage) -> Result<CaseType, DecodeError> {
    match message.get("type") {
        None => Ok(CaseType::default()),
        Some(Value::String(s)) => s.parse().map_err(|e: dp_klageinstans_kabal::UnknownCaseType| {
            DecodeError::InvalidValue {
                path: "type".to_string(),
                value: s.clone(),
                reason: e.to_string(),
            }
        }),
        Some(other) => Err(DecodeError::UnexpectedType {
            path: "type".to_string(),
            expected: "a string",
            actual: kind_of(other),
        }),
    }
}

/// Receipt date, from `opprettet` (`YYYY-MM-DD`).
///
/// # Errors
///
/// Returns [`DecodeError`] if `opprettet` is present but not a date.
pub fn received_date(message: &JsonMessage) -> Result<Option<NaiveDate>, DecodeError> {
    match message.get("opprettet") {
        None => Ok(None),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| DecodeError::InvalidValue {
                path: "opprettet".to_string(),
                value: s.clone(),
                reason: e.to_string(),
            }),
        Some(other) => Err(DecodeError::UnexpectedType {
            path: "opprettet".to_string(),
            expected: "a date string",
            actual: kind_of(other),
        }),
    }
}

/// Attached documents, from `tilknyttedeJournalposter`.
///
/// Absent or non-array means no documents. Every entry must be an object with
/// `type` and `journalpostId`.
///
/// # Errors
///
/// Returns [`DecodeError`] for the first malformed entry.
pub fn documents(message: &JsonMessage) -> Result<Vec<AttachedDocument>, DecodeError> {
    let Some(Value::Array(entries)) = message.get("tilknyttedeJournalposter") else {
        return Ok(Vec::new());
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = format!("tilknyttedeJournalposter[{i}]");
            let Value::Object(fields) = entry else {
                return Err(DecodeError::UnexpectedType {
                    path,
                    expected: "an object",
                    actual: kind_of(entry),
                });
            };
            let field = |name: &str| -> Result<String, DecodeError> {
                let value = fields
                    .get(name)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| DecodeError::Missing {
                        path: format!("{path}.{name}"),
                    })?;
                scalar_text(value).ok_or_else(|| DecodeError::UnexpectedType {
                    path: format!("{path}.{name}"),
                    expected: "a string",
                    actual: kind_of(value),
                })
            };
            Ok(AttachedDocument::new(field("type")?, field("journalpostId")?))
        })
        .collect()
}

/// Appointed representative, from either wire shape.
///
/// # Errors
///
/// Returns [`DecodeError`] if the nested object is malformed. The legacy flat
/// fields never fail; non-string values are ignored.
pub fn representative(message: &JsonMessage) -> Result<Option<Representative>, DecodeError> {
    let legacy = LegacyRepresentativeFields::from_message(message);

    match message.get(REPRESENTATIVE_FIELD) {
        Some(value) => {
            if !legacy.is_empty() {
                tracing::warn!(
                    "Message has both {REPRESENTATIVE_FIELD} and flat prosessfullmektig fields, using {REPRESENTATIVE_FIELD}"
                );
            }
            Ok(RepresentativeFields::decode(value)?.into_canonical())
        }
        None => Ok(legacy.into_canonical()),
    }
}

/// Nested `prosessFullmektig` object as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepresentativeFields {
    /// Name
    pub navn: Option<String>,
    /// National identifier
    pub ident: Option<String>,
    /// Postal address
    pub adresse: Option<AddressFields>,
}

/// Nested address object as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressFields {
    /// First address line
    pub adresselinje1: Option<String>,
    /// Second address line
    pub adresselinje2: Option<String>,
    /// Third address line
    pub adresselinje3: Option<String>,
    /// Postal code
    pub postnummer: Option<String>,
    /// Postal town
    pub poststed: Option<String>,
    /// ISO country code, `NO` when omitted
    pub land: Option<String>,
}

impl RepresentativeFields {
    /// Decode the nested object strictly.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if `value` is not an object or a field has the
    /// wrong type.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        if !value.is_object() {
            return Err(DecodeError::UnexpectedType {
                path: REPRESENTATIVE_FIELD.to_string(),
                expected: "an object",
                actual: kind_of(value),
            });
        }
        Self::deserialize(value).map_err(|e| DecodeError::Malformed {
            path: REPRESENTATIVE_FIELD.to_string(),
            reason: e.to_string(),
        })
    }

    /// Build the outbound representative.
    ///
    /// Absent unless a non-blank name or identifier is given. A given name is
    /// forwarded as-is, a blank identifier is dropped. The address is kept
    /// whenever an address object is given.
    #[must_use]
    pub fn into_canonical(self) -> Option<Representative> {
        let ident = non_blank(self.ident);
        let has_name = self.navn.as_deref().is_some_and(|navn| !navn.trim().is_empty());
        if !has_name && ident.is_none() {
            return None;
        }

        Some(Representative {
            id: ident.map(PersonId::person),
            navn: self.navn,
            adresse: self.adresse.map(|adresse| Address {
                addresselinje1: adresse.adresselinje1,
                addresselinje2: adresse.adresselinje2,
                addresselinje3: adresse.adresselinje3,
                postnummer: adresse.postnummer,
                poststed: adresse.poststed,
                land: non_blank(adresse.land).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            }),
        })
    }
}

/// Flat `prosessfullmektig*` fields of older producers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyRepresentativeFields {
    /// `prosessfullmektigNavn`
    pub navn: Option<String>,
    /// `prosessfullmektigIdent`
    pub ident: Option<String>,
    /// `prosessfullmektigAdresselinje1`
    pub adresselinje1: Option<String>,
    /// `prosessfullmektigAdresselinje2`
    pub adresselinje2: Option<String>,
    /// `prosessfullmektigAdresselinje3`
    pub adresselinje3: Option<String>,
    /// `prosessfullmektigPostnummer`
    pub postnummer: Option<String>,
    /// `prosessfullmektigPoststed`
    pub poststed: Option<String>,
    /// `prosessfullmektigLand`
    pub land: Option<String>,
}

impl LegacyRepresentativeFields {
    /// Read the flat fields. Only string values count.
    #[must_use]
    pub fn from_message(message: &JsonMessage) -> Self {
        let text = |key: &str| message.text(key).map(str::to_string);
        Self {
            navn: text("prosessfullmektigNavn"),
            ident: text("prosessfullmektigIdent"),
            adresselinje1: text("prosessfullmektigAdresselinje1"),
            adresselinje2: text("prosessfullmektigAdresselinje2"),
            adresselinje3: text("prosessfullmektigAdresselinje3"),
            postnummer: text("prosessfullmektigPostnummer"),
            poststed: text("prosessfullmektigPoststed"),
            land: text("prosessfullmektigLand"),
        }
    }

    /// Whether no flat field was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Convert to the outbound representative.
    ///
    /// Absent unless a non-blank name or identifier is given. The address is
    /// only kept when a non-blank country is given.
    #[must_use]
    pub fn into_canonical(self) -> Option<Representative> {
        let land = non_blank(self.land);
        let fields = RepresentativeFields {
            navn: self.navn,
            ident: self.ident,
            adresse: land.map(|land| AddressFields {
                adresselinje1: self.adresselinje1,
                adresselinje2: self.adresselinje2,
                adresselinje3: self.adresselinje3,
                postnummer: self.postnummer,
                poststed: self.poststed,
                land: Some(land),
            }),
        };
        fields.into_canonical()
    }
}
