use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    /// Directory records seeded into the store at startup.
    pub fixtures: Option<PathBuf>,
    pub topics: TopicsConfig,
    pub workers: WorkersConfig,
    pub ingestor: IngestorConfig,
    pub notify: NotifyConfig,
    pub server: ServerConfig,
    /// Bound on every store and cache call, in milliseconds.
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueueConfig {
    Memory,
    Nats {
        url: String,
        #[serde(default = "default_stream")]
        stream: String,
    },
    Mqtt {
        url: String,
        #[serde(default = "default_client_id")]
        client_id: String,
        username: Option<String>,
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub decoder_in: String,
    pub validator_in: String,
    pub validator_out: String,
    pub eventer_out: String,
}

/// Worker tasks per stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub ingestor: usize,
    pub decoder: usize,
    pub validator: usize,
    pub accumulator: usize,
    pub eventer: usize,
    pub alerter: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestorConfig {
    /// Broker devices publish to. When unset the ingestor subscribes on the
    /// pipeline queue.
    pub source: Option<MqttSourceConfig>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSourceConfig {
    pub url: String,
    #[serde(default = "default_source_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Provider credentials. A channel without credentials logs instead of
/// sending.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub pushover_token: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mailgun_api_key: Option<String>,
    pub mailgun_from: Option<String>,
    /// Minimum spacing between two sends on a channel, in milliseconds.
    pub app_spacing_ms: u64,
    pub sms_spacing_ms: u64,
    pub email_spacing_ms: u64,
    /// Bound on a single provider request, in milliseconds.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

fn default_stream() -> String {
    "sensa".to_owned()
}

fn default_client_id() -> String {
    "sensa".to_owned()
}

fn default_source_client_id() -> String {
    "sensa-ingestor".to_owned()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::Memory,
            store: StoreConfig::Memory,
            cache: CacheConfig::Memory,
            fixtures: None,
            topics: TopicsConfig::default(),
            workers: WorkersConfig::default(),
            ingestor: IngestorConfig::default(),
            notify: NotifyConfig::default(),
            server: ServerConfig::default(),
            op_timeout_ms: 5000,
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            decoder_in: "DecoderIn".to_owned(),
            validator_in: "ValidatorIn".to_owned(),
            validator_out: "ValidatorOut".to_owned(),
            eventer_out: "EventerOut".to_owned(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            ingestor: 4,
            decoder: 4,
            validator: 4,
            accumulator: 4,
            eventer: 4,
            alerter: 2,
        }
    }
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            source: None,
            topics: vec!["v1/#".to_owned(), "lora/#".to_owned()],
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            pushover_token: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from: None,
            mailgun_domain: None,
            mailgun_api_key: None,
            mailgun_from: None,
            app_spacing_ms: 1000,
            sms_spacing_ms: 1000,
            email_spacing_ms: 200,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}
