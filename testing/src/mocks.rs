//! In-memory doubles for the event bus and the Kabal client.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use async_trait::async_trait;
use dp_klageinstans_core::{Delivery, EventBus, EventBusError, EventStream, Record};
use dp_klageinstans_kabal::{CaseSubmitter, DeliveryOutcome, KabalError, StatusCode, SubmitCase};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

type Subscriber = (Vec<String>, mpsc::UnboundedSender<Result<Delivery, EventBusError>>);

/// In-memory event bus for fast, deterministic tests.
///
/// Every published record is kept for inspection and forwarded to subscribers
/// of its topic. Records injected with [`deliver`](Self::deliver) carry an ack
/// handle, so tests can observe whether the consumer acknowledged them.
///
/// # Example
///
/// ```
/// use dp_klageinstans_core::{EventBus, Record};
/// use dp_klageinstans_testing::InMemoryEventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// bus.publish("rapid", &Record::new(None, b"{}".to_vec())).await?;
/// assert_eq!(bus.published_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<(String, Record)>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    fail_publish: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail (or succeed again)
    pub fn fail_publishing(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Hand a record to every subscriber of `topic`, paired with an ack receiver.
    ///
    /// The receiver resolves once the delivery is acknowledged and errors if it
    /// is dropped unacknowledged (or nobody subscribes to `topic`).
    pub fn deliver(&self, topic: &str, record: Record) -> oneshot::Receiver<()> {
        let (delivery, ack) = Delivery::with_ack(topic.to_string(), record);
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        if let Some((_, tx)) = subscribers
            .iter()
            .find(|(topics, _)| topics.iter().any(|t| t == topic))
        {
            let _ = tx.send(Ok(delivery));
        }
        ack
    }

    /// Push a transport error to every subscriber
    pub fn fail_subscriptions(&self, error: &EventBusError) {
        for (_, tx) in self.subscribers.lock().unwrap().iter() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// End every open subscription stream
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    /// Number of currently open subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.len()
    }

    /// All published records with their topics, in publish order
    #[must_use]
    pub fn published(&self) -> Vec<(String, Record)> {
        self.published.lock().unwrap().clone()
    }

    /// Number of published records
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &Record,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let record = record.clone();
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "publishing disabled".to_string(),
                });
            }

            self.published
                .lock()
                .unwrap()
                .push((topic.clone(), record.clone()));

            for (topics, tx) in self.subscribers.lock().unwrap().iter() {
                if topics.contains(&topic) {
                    let _ = tx.send(Ok(Delivery::new(topic.clone(), record.clone())));
                }
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            self.subscribers.lock().unwrap().push((topics, tx));

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Response {
    Deliver(StatusCode),
    Reject(u16),
}

/// Case submitter that records calls instead of talking to Kabal.
#[derive(Clone, Debug)]
pub struct MockSubmitter {
    response: Arc<Mutex<Response>>,
    calls: Arc<Mutex<Vec<SubmitCase>>>,
}

impl MockSubmitter {
    /// A submitter that accepts every case with `200 OK`
    #[must_use]
    pub fn delivering() -> Self {
        Self::with_response(Response::Deliver(StatusCode::OK))
    }

    /// A submitter that rejects every case with `status`
    #[must_use]
    pub fn rejecting(status: u16) -> Self {
        Self::with_response(Response::Reject(status))
    }

    fn with_response(response: Response) -> Self {
        Self {
            response: Arc::new(Mutex::new(response)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Accept every following case
    pub fn deliver_from_now(&self) {
        *self.response.lock().unwrap() = Response::Deliver(StatusCode::OK);
    }

    /// Reject every following case with `status`
    pub fn reject_from_now(&self, status: u16) {
        *self.response.lock().unwrap() = Response::Reject(status);
    }

    /// Cases submitted so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<SubmitCase> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of cases submitted so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CaseSubmitter for MockSubmitter {
    async fn submit(&self, case: SubmitCase) -> DeliveryOutcome {
        self.calls.lock().unwrap().push(case);
        let response = *self.response.lock().unwrap();
        match response {
            Response::Deliver(status) => DeliveryOutcome::Delivered(status),
            Response::Reject(status) => DeliveryOutcome::Failed(KabalError::Rejected {
                status,
                body: String::new(),
            }),
        }
    }
}
