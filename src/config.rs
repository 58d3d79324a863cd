use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::flush::FlushConfig;
use crate::ingest::MqttSettings;

/// Where the shared buffer lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferBackend {
    Redis,
    Memory,
}

/// Where validated batches are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceBackend {
    Postgres,
    StoreApi,
    Memory,
}

impl FromStr for BufferBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(BufferBackend::Redis),
            "memory" => Ok(BufferBackend::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "BUFFER_BACKEND must be redis or memory, got {}",
                other
            ))),
        }
    }
}

impl FromStr for PersistenceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(PersistenceBackend::Postgres),
            "store_api" => Ok(PersistenceBackend::StoreApi),
            "memory" => Ok(PersistenceBackend::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "PERSISTENCE_BACKEND must be postgres, store_api or memory, got {}",
                other
            ))),
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Records per persisted batch
    pub batch_size: usize,
    pub buffer_backend: BufferBackend,
    pub redis_url: String,
    /// Redis list holding pending entries
    pub redis_queue_key: String,
    pub persistence_backend: PersistenceBackend,
    /// PostgreSQL database URL (postgres backend)
    pub database_url: Option<String>,
    /// Remote Store API base URL (store_api backend)
    pub store_api_base_url: Option<String>,
    pub store_api_timeout: Duration,
    pub enable_mqtt: bool,
    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    /// Store retries before a batch is dead-lettered
    pub persist_max_retries: u32,
    pub persist_retry_backoff: Duration,
    /// Queued groups per subscriber before new ones are dropped
    pub subscriber_channel_capacity: usize,
    pub max_subscribers: usize,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(default)
        };

        let batch_size: usize = parse_number("BATCH_SIZE", &var("BATCH_SIZE", "10"))?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BATCH_SIZE must be a positive integer".to_string(),
            ));
        }

        let persistence_backend: PersistenceBackend =
            var("PERSISTENCE_BACKEND", "postgres").parse()?;
        let database_url = lookup("DATABASE_URL");
        let store_api_base_url = lookup("STORE_API_BASE_URL");

        match persistence_backend {
            PersistenceBackend::Postgres if database_url.is_none() => {
                return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
            }
            PersistenceBackend::StoreApi if store_api_base_url.is_none() => {
                return Err(ConfigError::MissingEnvVar("STORE_API_BASE_URL".to_string()));
            }
            _ => {}
        }

        Ok(Self {
            port: var("ROADVISION_PORT", "8000")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: var("ROADVISION_BIND_ADDR", "0.0.0.0"),
            batch_size,
            buffer_backend: var("BUFFER_BACKEND", "redis").parse()?,
            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_queue_key: var("REDIS_QUEUE_KEY", "processed_agent_data"),
            persistence_backend,
            database_url,
            store_api_base_url,
            store_api_timeout: Duration::from_secs(parse_number(
                "STORE_API_TIMEOUT_SECONDS",
                &var("STORE_API_TIMEOUT_SECONDS", "10"),
            )?),
            enable_mqtt: flag("ENABLE_MQTT", true),
            mqtt_broker_host: var("MQTT_BROKER_HOST", "localhost"),
            mqtt_broker_port: var("MQTT_BROKER_PORT", "1883")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            mqtt_topic: var("MQTT_TOPIC", "processed_agent_data_topic"),
            mqtt_client_id: var("MQTT_CLIENT_ID", "roadvision-hub"),
            persist_max_retries: parse_number(
                "PERSIST_MAX_RETRIES",
                &var("PERSIST_MAX_RETRIES", "3"),
            )?,
            persist_retry_backoff: Duration::from_millis(parse_number(
                "PERSIST_RETRY_BACKOFF_MS",
                &var("PERSIST_RETRY_BACKOFF_MS", "200"),
            )?),
            subscriber_channel_capacity: parse_number(
                "SUBSCRIBER_CHANNEL_CAPACITY",
                &var("SUBSCRIBER_CHANNEL_CAPACITY", "64"),
            )?,
            max_subscribers: parse_number("MAX_SUBSCRIBERS", &var("MAX_SUBSCRIBERS", "10000"))?,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn flush_config(&self) -> FlushConfig {
        FlushConfig {
            batch_size: self.batch_size,
            max_retries: self.persist_max_retries,
            retry_backoff: self.persist_retry_backoff,
        }
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_broker_host.clone(),
            port: self.mqtt_broker_port,
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} must be a number, got {}", key, raw)))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
