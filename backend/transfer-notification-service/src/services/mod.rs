pub mod decoder;
pub mod kafka_consumer;
pub mod notification_store;
pub mod pipeline;

pub use decoder::decode;
pub use kafka_consumer::{KafkaReader, MessageReader, RawMessage};
pub use notification_store::{MongoNotificationStore, NotificationSink};
pub use pipeline::{persist_message, NotificationPipeline, PipelineState, PipelineStats};
