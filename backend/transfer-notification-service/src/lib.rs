pub mod config;
pub mod error;
pub mod models;
pub mod runner;
pub mod services;
pub mod shutdown;

pub use self::config::{BrokerConfig, Config, StorageConfig};
pub use error::{ConsumerError, DecodeError, Result};
pub use models::Notification;
pub use runner::run;
pub use services::*;
pub use shutdown::Shutdown;
