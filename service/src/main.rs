//! dp-send-til-klageinstans server
//!
//! Consumes the rapid, forwards complaint cases to Kabal and serves health
//! and metrics endpoints until shut down.
//!
//! # Usage
//!
//! ```bash
//! KAFKA_BROKERS=localhost:9092 \
//! KAFKA_RAPID_TOPIC=teamdagpenger.rapid.v1 \
//! KABAL_API_URL=http://localhost:8090 \
//! cargo run --bin dp-send-til-klageinstans
//! ```

use dp_klageinstans_runtime::MetricsRecorder;
use dp_send_til_klageinstans::{Application, Config, LogFormat};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    tracing::info!("Starting dp-send-til-klageinstans");
    tracing::info!(
        brokers = %config.kafka.brokers,
        topic = %config.kafka.rapid_topic,
        consumer_group = %config.kafka.consumer_group_id,
        "Configuration loaded"
    );

    let mut metrics = MetricsRecorder::new();
    metrics.install()?;

    let app = Application::build(&config, Arc::new(metrics)).await?;
    app.run().await
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,rdkafka=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
