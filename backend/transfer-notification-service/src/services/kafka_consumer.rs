/// Kafka side of the transfer notification pipeline
///
/// `MessageReader` is the narrow capability the pipeline loop depends on;
/// `KafkaReader` implements it on top of an rdkafka `StreamConsumer` with
/// manual offset commits and a single assigned partition.
use crate::config::BrokerConfig;
use crate::error::{ConsumerError, Result};
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

/// Owned copy of one broker record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Empty when the record carried no payload
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn from_kafka<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }
}

/// Source of raw transfer events
#[async_trait]
pub trait MessageReader: Send {
    /// Block until the next record arrives or `shutdown` fires
    ///
    /// Returns [`ConsumerError::Cancelled`] on shutdown and
    /// [`ConsumerError::Transport`] on broker failures.
    async fn next(&mut self, shutdown: &mut Shutdown) -> Result<RawMessage>;

    /// Advance the committed offset past `message`
    async fn commit(&mut self, message: &RawMessage) -> Result<()>;

    /// Release the broker session
    async fn close(&mut self);
}

pub struct KafkaReader {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
}

impl KafkaReader {
    /// Create the consumer and assign the configured topic partition
    ///
    /// Reading starts from the group's stored offset, falling back to
    /// `auto.offset.reset` when the group has none.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        // Auto-commit is disabled: offsets only move after a successful save
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.server_address)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("fetch.min.bytes", config.fetch_min_bytes.to_string())
            .set("fetch.max.bytes", config.fetch_max_bytes.to_string())
            .create()
            .map_err(|e| ConsumerError::Setup(format!("Failed to create Kafka consumer: {e}")))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&config.topic, config.partition, Offset::Stored)
            .map_err(|e| ConsumerError::Setup(format!("Invalid topic partition: {e}")))?;
        consumer.assign(&tpl).map_err(|e| {
            ConsumerError::Setup(format!(
                "Failed to assign {}[{}]: {e}",
                config.topic, config.partition
            ))
        })?;

        info!(
            brokers = %config.server_address,
            topic = %config.topic,
            partition = config.partition,
            group_id = %config.group_id,
            "Kafka reader initialized"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            partition: config.partition,
        })
    }
}

#[async_trait]
impl MessageReader for KafkaReader {
    async fn next(&mut self, shutdown: &mut Shutdown) -> Result<RawMessage> {
        if shutdown.is_triggered() {
            return Err(ConsumerError::Cancelled);
        }

        tokio::select! {
            biased;

            _ = shutdown.triggered() => Err(ConsumerError::Cancelled),

            received = self.consumer.recv() => match received {
                Ok(message) => {
                    debug!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );
                    Ok(RawMessage::from_kafka(&message))
                }
                Err(e) => Err(ConsumerError::Transport(e)),
            },
        }
    }

    async fn commit(&mut self, message: &RawMessage) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(ConsumerError::Commit)?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(ConsumerError::Commit)?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset + 1,
            "Committed offset"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.consumer.unassign() {
            warn!(error = %e, "Failed to unassign Kafka partition");
        }
        info!(
            topic = %self.topic,
            partition = self.partition,
            "Kafka reader closed"
        );
    }
}
