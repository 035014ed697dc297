use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use transfer_notification_service::config::{Config, DEFAULT_CONFIG_PATH};
use transfer_notification_service::{run, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    init_tracing(&config);

    info!(
        config_path = %config_path,
        storage_uri = %config.storage.redacted_uri(),
        database = %config.storage.database,
        collection = %config.storage.collection,
        kafka_brokers = %config.kafka.server_address,
        kafka_topic = %config.kafka.topic,
        kafka_group_id = %config.kafka.group_id,
        "Starting transfer notification service"
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_signals(trigger));

    let stats = run(&config, shutdown)
        .await
        .context("Transfer notification service failed to start")?;

    info!(
        received = stats.received,
        committed = stats.committed,
        "Transfer notification service stopped"
    );
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "transfer_notification_service={},rdkafka=warn",
            config.log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
