//! Application lifecycle.
//!
//! Wires the rapid consumer, the Kabal client and the health server together
//! and coordinates shutdown.
//!
//! # Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. Shutdown is broadcast to the consumer and the health server
//! 2. The consumer finishes the message in flight (10s timeout)
//! 3. The health server drains its connections
//!
//! When the consumer stops on a fatal error the same broadcast stops the
//! health server, and [`Application::run`] returns the error so the process
//! exits non-zero. The failing message stays uncommitted.

use crate::behov::KlageBehovHandler;
use crate::config::{Config, KafkaConfig};
use crate::server::{self, HealthState};
use anyhow::Context;
use dp_klageinstans_kabal::{ClientCredentialsTokenProvider, KabalClient};
use dp_klageinstans_redpanda::RedpandaEventBus;
use dp_klageinstans_runtime::{ConsumerError, MetricsRecorder, RapidsConsumer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Name the consumer reports in logs.
pub const APP_NAME: &str = "dp-send-til-klageinstans";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The assembled service.
pub struct Application {
    listener: TcpListener,
    consumer: RapidsConsumer,
    health: HealthState,
    shutdown_tx: broadcast::Sender<()>,
}

impl Application {
    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kafka client, the Kabal client or the HTTP
    /// listener cannot be created.
    pub async fn build(config: &Config, metrics: Arc<MetricsRecorder>) -> anyhow::Result<Self> {
        let event_bus = Arc::new(
            event_bus_builder(&config.kafka)
                .build()
                .context("Failed to create Kafka client")?,
        );

        let token_provider = Arc::new(ClientCredentialsTokenProvider::new(
            config.kabal.credentials.clone(),
        ));
        let kabal = KabalClient::with_timeout(
            &config.kabal.base_url,
            token_provider,
            config.kabal.timeout,
        )
        .context("Failed to create Kabal client")?;
        info!(
            kabal = %kabal.base_url(),
            skipped = config.skipped_behandlinger.len(),
            "Kabal client configured"
        );

        let handler = KlageBehovHandler::new(
            Arc::new(kabal),
            config.skipped_behandlinger.iter().cloned(),
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        let consumer = RapidsConsumer::builder()
            .name(APP_NAME)
            .topic(&config.kafka.rapid_topic)
            .event_bus(event_bus)
            .river(handler.into_river())
            .shutdown(shutdown_tx.subscribe())
            .build()?;

        let listener = TcpListener::bind(("0.0.0.0", config.http_port))
            .await
            .with_context(|| format!("Failed to bind HTTP port {}", config.http_port))?;

        let health = HealthState::new(consumer.ready_flag(), metrics);

        Ok(Self {
            listener,
            consumer,
            health,
            shutdown_tx,
        })
    }

    /// Address the health server listens on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until a shutdown signal arrives or the consumer stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer stopped on a fatal error or the
    /// health server failed.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(address = ?self.listener.local_addr().ok(), "Starting health server");

        let mut server_shutdown = self.shutdown_tx.subscribe();
        let app = server::router(self.health);
        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.recv().await;
                })
                .await
        });

        let mut consumer = self.consumer.spawn();

        let stopped = tokio::select! {
            () = shutdown_signal() => None,
            result = &mut consumer => Some(result),
        };
        let _ = self.shutdown_tx.send(());
        let consumer_result = match stopped {
            Some(result) => flatten(result),
            None => await_consumer(consumer).await,
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
            Ok(Ok(Ok(()))) => info!("Health server stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Health server failed"),
            Ok(Err(e)) => warn!(error = %e, "Health server task failed"),
            Err(_) => warn!("Health server shutdown timed out"),
        }

        consumer_result?;
        info!("Graceful shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("listener", &self.listener.local_addr().ok())
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

/// Kafka client settings, including SSL when configured.
fn event_bus_builder(kafka: &KafkaConfig) -> dp_klageinstans_redpanda::RedpandaEventBusBuilder {
    let builder = RedpandaEventBus::builder()
        .brokers(&kafka.brokers)
        .consumer_group(&kafka.consumer_group_id)
        .auto_offset_reset(&kafka.reset_policy);

    match &kafka.ssl {
        Some(ssl) => builder
            .client_config("security.protocol", "ssl")
            .client_config("ssl.ca.location", &ssl.ca_path)
            .client_config("ssl.certificate.location", &ssl.certificate_path)
            .client_config("ssl.key.location", &ssl.private_key_path),
        None => builder,
    }
}

async fn await_consumer(consumer: JoinHandle<Result<(), ConsumerError>>) -> anyhow::Result<()> {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, consumer).await {
        Ok(result) => flatten(result),
        Err(_) => {
            warn!("Consumer shutdown timed out");
            Ok(())
        }
    }
}

fn flatten(
    result: Result<Result<(), ConsumerError>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            error!(error = %e, "Consumer task failed");
            Err(anyhow::anyhow!("Consumer task failed: {e}"))
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
