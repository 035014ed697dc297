//! Wiring of the real broker and store into the pipeline

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    KafkaReader, MongoNotificationStore, NotificationPipeline, NotificationSink, PipelineStats,
};
use crate::shutdown::Shutdown;
use tracing::error;

/// Connect to MongoDB and Kafka, then consume until `shutdown` fires
///
/// Setup failures are returned before any message is read. Once the loop is
/// running, errors are handled inside it and only the final counters come back.
pub async fn run(config: &Config, shutdown: Shutdown) -> Result<PipelineStats> {
    let store = MongoNotificationStore::connect(&config.storage).await?;

    let reader = match KafkaReader::new(&config.kafka) {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = %e, "Failed to create Kafka reader");
            store.close().await;
            return Err(e);
        }
    };

    Ok(NotificationPipeline::new(reader, store, shutdown).run().await)
}
