use crate::error::{ConsumerError, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `GW_KAFKA__TOPIC=transfers`
pub const ENV_PREFIX: &str = "GW";

/// Default location of the YAML configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Keys of the first-generation `config.yml` and the keys they now map to
///
/// A legacy value only fills in for its new key; a new key in the same file
/// or a `GW_*` variable still takes precedence.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("mongo_conn", "storage.uri"),
    ("kafka.KafkaServerAddress", "kafka.server_address"),
    ("kafka.KafkaTopic", "kafka.topic"),
    ("kafka.KafkaGroupID", "kafka.group_id"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    /// `text` or `json`
    pub log_format: String,
    pub storage: StorageConfig,
    pub kafka: BrokerConfig,
}

/// Connection settings for the notification store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Server selection timeout used when connecting
    pub connect_timeout_ms: u64,
}

/// Where and how to read transfer events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub server_address: String,
    pub topic: String,
    pub group_id: String,
    pub partition: i32,
    pub fetch_min_bytes: u32,
    pub fetch_max_bytes: u32,
    pub session_timeout_ms: u32,
    /// `earliest` or `latest`, used when the group has no stored offset
    pub auto_offset_reset: String,
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and `GW_*`
    /// environment variables, in that order of precedence (lowest first).
    pub fn load(path: &str) -> Result<Self> {
        let builder =
            Self::defaults()?.add_source(File::new(path, FileFormat::Yaml).required(false));

        let config: Config = with_legacy_keys(builder)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Builder pre-populated with every default value
    pub fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?
            .set_default("storage.uri", "mongodb://localhost:27018")?
            .set_default("storage.database", "notifications")?
            .set_default("storage.collection", "transfers")?
            .set_default("storage.connect_timeout_ms", 10_000)?
            .set_default("kafka.server_address", "localhost:9092")?
            .set_default("kafka.topic", "notification")?
            .set_default("kafka.group_id", "notifications")?
            .set_default("kafka.partition", 0)?
            .set_default("kafka.fetch_min_bytes", 10_000)? // 10KB
            .set_default("kafka.fetch_max_bytes", 10_000_000)? // 10MB
            .set_default("kafka.session_timeout_ms", 30_000)?
            .set_default("kafka.auto_offset_reset", "earliest")
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(invalid(format!(
                "log_format must be 'text' or 'json', got '{}'",
                self.log_format
            )));
        }

        self.storage.validate()?;
        self.kafka.validate()
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(invalid("storage.uri is required"));
        }
        if self.database.is_empty() {
            return Err(invalid("storage.database is required"));
        }
        if self.collection.is_empty() {
            return Err(invalid("storage.collection is required"));
        }
        Ok(())
    }

    /// Connection string with the password masked, safe for logs
    pub fn redacted_uri(&self) -> String {
        let Some(scheme_end) = self.uri.find("://").map(|i| i + 3) else {
            return self.uri.clone();
        };
        let rest = &self.uri[scheme_end..];
        let Some(at) = rest.rfind('@') else {
            return self.uri.clone();
        };

        match rest[..at].find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.uri[..scheme_end],
                &rest[..colon],
                &rest[at..]
            ),
            None => self.uri.clone(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_address.is_empty() {
            return Err(invalid("kafka.server_address is required"));
        }
        if self.topic.is_empty() {
            return Err(invalid("kafka.topic is required"));
        }
        if self.group_id.is_empty() {
            return Err(invalid("kafka.group_id is required"));
        }
        if self.partition < 0 {
            return Err(invalid("kafka.partition must not be negative"));
        }
        if self.fetch_min_bytes == 0 {
            return Err(invalid("kafka.fetch_min_bytes must be greater than 0"));
        }
        if self.fetch_min_bytes > self.fetch_max_bytes {
            return Err(invalid(
                "kafka.fetch_min_bytes must not exceed kafka.fetch_max_bytes",
            ));
        }
        if !matches!(self.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(invalid(format!(
                "kafka.auto_offset_reset must be 'earliest' or 'latest', got '{}'",
                self.auto_offset_reset
            )));
        }
        Ok(())
    }
}

/// Lift legacy keys found in the sources so far into the defaults layer
fn with_legacy_keys(
    mut builder: ConfigBuilder<DefaultState>,
) -> std::result::Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    let layered = builder.build_cloned()?;
    for (legacy, current) in LEGACY_KEYS {
        if let Ok(value) = layered.get_string(legacy) {
            builder = builder.set_default(*current, value)?;
        }
    }
    Ok(builder)
}

fn invalid(msg: impl Into<String>) -> ConsumerError {
    ConsumerError::Config(msg.into())
}
