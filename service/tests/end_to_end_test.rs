//! Behov to Kabal and back, with Kabal mocked over HTTP

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use dp_klageinstans_core::{EventBus, Record};
use dp_klageinstans_kabal::{KabalClient, OVERSENDELSE_PATH, StaticTokenProvider};
use dp_klageinstans_runtime::{ConsumerError, RapidsConsumer};
use dp_klageinstans_testing::{InMemoryEventBus, TestRapid, init_test_logging};
use dp_send_til_klageinstans::KlageBehovHandler;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOPIC: &str = "teamdagpenger.rapid.v1";

fn handler(server: &MockServer) -> KlageBehovHandler {
    let client = KabalClient::new(server.uri(), Arc::new(StaticTokenProvider::new("token")));
    KlageBehovHandler::new(Arc::new(client), Vec::new())
}

fn behov() -> Value {
    json!({
        "@event_name": "behov",
        "@behov": ["OversendelseKlageinstans"],
        "ident": "11111111111",
        "behandlingId": "B1",
        "fagsakId": "F1",
        "behandlendeEnhet": "4408",
        "hjemler": ["X_1"]
    })
}

fn expected_body() -> Value {
    json!({
        "type": "KLAGE",
        "sakenGjelder": { "id": { "type": "PERSON", "verdi": "11111111111" } },
        "fagsak": { "fagsakId": "F1", "fagsystem": "DAGPENGER" },
        "kildeReferanse": "B1",
        "hjemler": ["X_1"],
        "forrigeBehandlendeEnhet": "4408",
        "tilknyttedeJournalposter": [],
        "ytelse": "DAG_DAG"
    })
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition met in time");
}

#[tokio::test]
async fn accepted_case_is_answered_on_the_rapid() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OVERSENDELSE_PATH))
        .and(header("Authorization", "Bearer token"))
        .and(body_json(expected_body()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut rapid = TestRapid::new();
    rapid.register(handler(&server).into_river());

    rapid.send_test_message(&behov().to_string()).await.unwrap();

    let inspector = rapid.inspector();
    assert_eq!(inspector.size(), 1);
    assert_eq!(inspector.key(0), Some("11111111111"));
    assert_eq!(
        inspector.field(0, "@løsning"),
        json!({ "OversendelseKlageinstans": "OK" })
    );
}

#[tokio::test]
async fn rejected_case_is_not_answered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OVERSENDELSE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&server)
        .await;

    let mut rapid = TestRapid::new();
    rapid.register(handler(&server).into_river());

    let result = rapid.send_test_message(&behov().to_string()).await;

    assert!(result.is_err());
    assert!(rapid.inspector().is_empty());
}

#[tokio::test]
async fn consumer_commits_answered_behov() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OVERSENDELSE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = RapidsConsumer::builder()
        .topic(TOPIC)
        .event_bus(Arc::new(bus.clone()) as Arc<dyn EventBus>)
        .river(handler(&server).into_river())
        .shutdown(shutdown_rx)
        .build()
        .unwrap();
    let ready = consumer.ready_flag();
    let handle = consumer.spawn();
    wait_for(|| ready.load(Ordering::SeqCst)).await;

    let ack = bus.deliver(TOPIC, Record::new(None, behov().to_string().into_bytes()));

    assert!(ack.await.is_ok());
    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.key.as_deref(), Some("11111111111"));

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn consumer_stops_when_kabal_rejects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OVERSENDELSE_PATH))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let bus = InMemoryEventBus::new();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = RapidsConsumer::builder()
        .topic(TOPIC)
        .event_bus(Arc::new(bus.clone()) as Arc<dyn EventBus>)
        .river(handler(&server).into_river())
        .shutdown(shutdown_rx)
        .build()
        .unwrap();
    let ready = consumer.ready_flag();
    let handle = consumer.spawn();
    wait_for(|| ready.load(Ordering::SeqCst)).await;

    let ack = bus.deliver(TOPIC, Record::new(None, behov().to_string().into_bytes()));

    assert!(ack.await.is_err());
    match handle.await.unwrap() {
        Err(ConsumerError::Fatal { topic, river, .. }) => {
            assert_eq!(topic, TOPIC);
            assert_eq!(river, "OversendelseKlageinstans");
        }
        other => panic!("expected fatal error, got {other:?}"),
    }
    assert_eq!(bus.published_count(), 0);
}
