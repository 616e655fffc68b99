//! Behaviour of the `OversendelseKlageinstans` solver on a test rapid

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use dp_klageinstans_core::RiverOutcome;
use dp_klageinstans_kabal::{Address, AttachedDocument, CaseType, PersonId, Representative};
use dp_klageinstans_testing::{MockSubmitter, TestRapid};
use dp_send_til_klageinstans::{BehovError, DecodeError, KlageBehovHandler};
use serde_json::{Value, json};
use std::sync::Arc;

const BEHANDLING_ID: &str = "0196fcc3-75e1-7846-ab74-de339f20ebc3";

fn rapid(submitter: &MockSubmitter, skipped: &[&str]) -> TestRapid {
    let mut rapid = TestRapid::new();
    rapid.register(
        KlageBehovHandler::new(
            Arc::new(submitter.clone()),
            skipped.iter().map(ToString::to_string),
        )
        .into_river(),
    );
    rapid
}

fn behov(extra: &Value) -> String {
    let mut message = json!({
        "@event_name": "behov",
        "@behov": ["OversendelseKlageinstans"],
        "@id": "7a1f6e2c-0000-4000-8000-000000000001",
        "ident": "11111111111",
        "behandlingId": BEHANDLING_ID,
        "fagsakId": "F1",
        "behandlendeEnhet": "4408",
        "hjemler": ["X_1"]
    });
    if let (Some(target), Some(extra)) = (message.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    message.to_string()
}

#[tokio::test]
async fn delivered_case_is_answered_with_losning() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);
    let sent = behov(&json!({}));

    let outcomes = rapid.send_test_message(&sent).await.unwrap();

    assert_eq!(outcomes, vec![RiverOutcome::Handled]);
    let inspector = rapid.inspector();
    assert_eq!(inspector.size(), 1);
    assert_eq!(inspector.key(0), Some("11111111111"));

    let mut expected: Value = serde_json::from_str(&sent).unwrap();
    expected["@løsning"] = json!({ "OversendelseKlageinstans": "OK" });
    assert_eq!(inspector.message(0).into_value(), expected);
}

#[tokio::test]
async fn minimal_behov_maps_to_minimal_case() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid.send_test_message(&behov(&json!({}))).await.unwrap();

    let calls = submitter.calls();
    assert_eq!(calls.len(), 1);
    let case = &calls[0];
    assert_eq!(case.case_type, CaseType::Klage);
    assert_eq!(case.behandling_id, BEHANDLING_ID);
    assert_eq!(case.ident, "11111111111");
    assert_eq!(case.fagsak_id, "F1");
    assert_eq!(case.behandlende_enhet, "4408");
    assert_eq!(case.hjemler, vec!["X_1".to_string()]);
    assert!(case.documents.is_empty());
    assert_eq!(case.representative, None);
    assert_eq!(case.received_date, None);
    assert_eq!(case.comment, None);
}

#[tokio::test]
async fn optional_fields_are_forwarded() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid
        .send_test_message(&behov(&json!({
            "type": "ANKE",
            "opprettet": "2025-01-15",
            "kommentar": "Se vedlegg",
            "tilknyttedeJournalposter": [
                { "type": "BRUKERS_KLAGE", "journalpostId": "JP1" },
                { "type": "KLAGE_VEDTAK", "journalpostId": "JP2" }
            ]
        })))
        .await
        .unwrap();

    let case = &submitter.calls()[0];
    assert_eq!(case.case_type, CaseType::Anke);
    assert_eq!(case.received_date.map(|d| d.to_string()).as_deref(), Some("2025-01-15"));
    assert_eq!(case.comment.as_deref(), Some("Se vedlegg"));
    assert_eq!(
        case.documents,
        vec![
            AttachedDocument::new("BRUKERS_KLAGE", "JP1"),
            AttachedDocument::new("KLAGE_VEDTAK", "JP2"),
        ]
    );
}

#[tokio::test]
async fn nested_representative_is_forwarded() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid
        .send_test_message(&behov(&json!({
            "prosessFullmektig": {
                "navn": "Advokat Hansen",
                "adresse": {
                    "adresselinje1": "Storgata 1",
                    "postnummer": "0155",
                    "poststed": "Oslo"
                }
            }
        })))
        .await
        .unwrap();

    assert_eq!(
        submitter.calls()[0].representative,
        Some(Representative {
            id: None,
            navn: Some("Advokat Hansen".to_string()),
            adresse: Some(Address {
                addresselinje1: Some("Storgata 1".to_string()),
                addresselinje2: None,
                addresselinje3: None,
                postnummer: Some("0155".to_string()),
                poststed: Some("Oslo".to_string()),
                land: "NO".to_string(),
            }),
        })
    );
}

#[tokio::test]
async fn legacy_representative_is_forwarded() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid
        .send_test_message(&behov(&json!({
            "prosessfullmektigNavn": "Advokat Hansen",
            "prosessfullmektigIdent": "22222222222",
            "prosessfullmektigAdresselinje1": "Storgata 1",
            "prosessfullmektigPostnummer": "0155",
            "prosessfullmektigPoststed": "Oslo",
            "prosessfullmektigLand": "NO"
        })))
        .await
        .unwrap();

    let representative = submitter.calls()[0].representative.clone().unwrap();
    assert_eq!(representative.navn.as_deref(), Some("Advokat Hansen"));
    assert_eq!(representative.id, Some(PersonId::person("22222222222")));
    let address = representative.adresse.unwrap();
    assert_eq!(address.addresselinje1.as_deref(), Some("Storgata 1"));
    assert_eq!(address.land, "NO");
}

#[tokio::test]
async fn legacy_representative_without_country_has_no_address() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid
        .send_test_message(&behov(&json!({
            "prosessfullmektigNavn": "Advokat Hansen",
            "prosessfullmektigIdent": "22222222222",
            "prosessfullmektigAdresselinje1": "Storgata 1"
        })))
        .await
        .unwrap();

    let representative = submitter.calls()[0].representative.clone().unwrap();
    assert_eq!(representative.navn.as_deref(), Some("Advokat Hansen"));
    assert_eq!(representative.id, Some(PersonId::person("22222222222")));
    assert_eq!(representative.adresse, None);
}

#[tokio::test]
async fn rejected_case_is_fatal_and_unanswered() {
    let submitter = MockSubmitter::rejecting(500);
    let rapid = rapid(&submitter, &[]);

    let error = rapid
        .send_test_message(&behov(&json!({})))
        .await
        .expect_err("a rejected case must fail the behov");

    assert_eq!(submitter.call_count(), 1);
    assert!(rapid.inspector().is_empty());
    let behov_error = error.downcast_ref::<BehovError>().unwrap();
    assert!(matches!(
        behov_error,
        BehovError::Delivery { behandling_id, .. } if behandling_id == BEHANDLING_ID
    ));
}

#[tokio::test]
async fn redelivery_after_recovery_is_answered() {
    let submitter = MockSubmitter::rejecting(503);
    let rapid = rapid(&submitter, &[]);
    let sent = behov(&json!({}));

    assert!(rapid.send_test_message(&sent).await.is_err());
    submitter.deliver_from_now();
    rapid.send_test_message(&sent).await.unwrap();

    assert_eq!(submitter.call_count(), 2);
    assert_eq!(rapid.inspector().size(), 1);
}

#[tokio::test]
async fn skipped_behandling_is_neither_sent_nor_answered() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[BEHANDLING_ID]);

    let outcomes = rapid.send_test_message(&behov(&json!({}))).await.unwrap();

    assert_eq!(outcomes, vec![RiverOutcome::Handled]);
    assert_eq!(submitter.call_count(), 0);
    assert!(rapid.inspector().is_empty());
}

#[tokio::test]
async fn skipped_numeric_behandling_id_is_neither_sent_nor_answered() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &["12345"]);

    let outcomes = rapid
        .send_test_message(&behov(&json!({ "behandlingId": 12345 })))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![RiverOutcome::Handled]);
    assert_eq!(submitter.call_count(), 0);
    assert!(rapid.inspector().is_empty());
}

#[tokio::test]
async fn numeric_behandling_id_is_forwarded_as_text() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    rapid
        .send_test_message(&behov(&json!({ "behandlingId": 12345 })))
        .await
        .unwrap();

    assert_eq!(submitter.calls()[0].behandling_id, "12345");
    assert_eq!(rapid.inspector().size(), 1);
}

#[tokio::test]
async fn missing_required_field_is_not_sent() {
    for field in ["ident", "behandlingId", "fagsakId", "behandlendeEnhet", "hjemler"] {
        let submitter = MockSubmitter::delivering();
        let rapid = rapid(&submitter, &[]);
        let mut message: Value = serde_json::from_str(&behov(&json!({}))).unwrap();
        message.as_object_mut().unwrap().remove(field);

        let outcomes = rapid.send_test_message(&message.to_string()).await.unwrap();

        assert_eq!(outcomes, vec![RiverOutcome::Invalid], "without {field}");
        assert_eq!(submitter.call_count(), 0, "without {field}");
        assert!(rapid.inspector().is_empty(), "without {field}");
    }
}

#[tokio::test]
async fn answered_behov_is_ignored() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    let outcomes = rapid
        .send_test_message(&behov(&json!({
            "@løsning": { "OversendelseKlageinstans": "OK" }
        })))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![RiverOutcome::Skipped]);
    assert_eq!(submitter.call_count(), 0);
}

#[tokio::test]
async fn other_behov_is_ignored() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    let outcomes = rapid
        .send_test_message(&behov(&json!({ "@behov": ["Journalføring"] })))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![RiverOutcome::Skipped]);
    assert_eq!(submitter.call_count(), 0);
}

#[tokio::test]
async fn malformed_document_fails_before_sending() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    let error = rapid
        .send_test_message(&behov(&json!({
            "tilknyttedeJournalposter": [
                { "type": "BRUKERS_KLAGE", "journalpostId": "JP1" },
                { "type": "KLAGE_VEDTAK" }
            ]
        })))
        .await
        .expect_err("a document without journalpostId must fail");

    assert_eq!(submitter.call_count(), 0);
    let BehovError::Decode { source, .. } = error.downcast_ref::<BehovError>().unwrap() else {
        unreachable!("expected a decode error");
    };
    assert!(matches!(
        source,
        DecodeError::Missing { path } if path == "tilknyttedeJournalposter[1].journalpostId"
    ));
}

#[tokio::test]
async fn unknown_case_type_fails_before_sending() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);

    let result = rapid
        .send_test_message(&behov(&json!({ "type": "OMGJØRING" })))
        .await;

    assert!(result.is_err());
    assert_eq!(submitter.call_count(), 0);
}

#[tokio::test]
async fn publish_failure_is_fatal() {
    let submitter = MockSubmitter::delivering();
    let rapid = rapid(&submitter, &[]);
    rapid.fail_publishing(true);

    let result = rapid.send_test_message(&behov(&json!({}))).await;

    assert!(result.is_err());
    assert_eq!(submitter.call_count(), 1);
    assert!(rapid.inspector().is_empty());
}
