use crate::config::StorageConfig;
use crate::error::{ConsumerError, Result};
use crate::models::{Notification, TransferNotificationDocument};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use std::time::Duration;
use tracing::info;

/// Destination for decoded notifications
///
/// Implementations perform exactly one write per call and never retry; the
/// pipeline decides what a failure means for the broker offset.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn save(&self, notification: &Notification) -> Result<()>;

    /// Release the underlying connection
    async fn close(&self);
}

/// MongoDB-backed sink writing one document per notification
pub struct MongoNotificationStore {
    client: Client,
    collection: Collection<TransferNotificationDocument>,
}

impl MongoNotificationStore {
    /// Connect and ping the database
    ///
    /// The driver connects lazily, so the ping is what turns an unreachable
    /// store into a startup failure.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| ConsumerError::Setup(format!("Invalid MongoDB connection string: {e}")))?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(Duration::from_millis(config.connect_timeout_ms));

        let client = Client::with_options(options)
            .map_err(|e| ConsumerError::Setup(format!("Failed to create MongoDB client: {e}")))?;

        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| ConsumerError::Setup(format!("Failed to connect to MongoDB: {e}")))?;

        info!(
            uri = %config.redacted_uri(),
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            collection: database.collection(&config.collection),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for MongoNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<()> {
        let document = TransferNotificationDocument::from(notification);
        self.collection.insert_one(document, None).await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client closed");
    }
}
