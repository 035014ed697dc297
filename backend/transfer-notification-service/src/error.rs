//! Error types for the transfer notification consumer
//!
//! Loop-level errors (`Transport`, `Decode`, `Storage`, `Commit`) are handled
//! inside the pipeline and never leave it. Only `Setup` and `Config` reach the
//! process boundary.

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Result type for consumer operations
pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The shutdown signal fired while waiting on the broker
    #[error("consumer cancelled by shutdown signal")]
    Cancelled,

    /// Broker connectivity or read failure
    #[error("Kafka transport error: {0}")]
    Transport(#[source] KafkaError),

    /// Payload could not be turned into a notification
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] mongodb::error::Error),

    /// Offset could not be advanced
    #[error("offset commit failed: {0}")]
    Commit(#[source] KafkaError),

    /// Store or broker client could not be established at startup
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ConsumerError {
    /// True when the error ends the consume loop cleanly
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsumerError::Cancelled)
    }
}

impl From<config::ConfigError> for ConsumerError {
    fn from(err: config::ConfigError) -> Self {
        ConsumerError::Config(err.to_string())
    }
}

/// Errors produced while decoding a raw broker payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    /// Invalid JSON, a missing field or a field of the wrong type
    #[error("malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
