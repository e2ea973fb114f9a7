//! Service configuration
//!
//! Loaded from a YAML file at `$CONFIG_PATH` (default `./config.yaml`).
//! Every section has defaults; `normalize` rewrites zero or invalid values
//! back to them so the rest of the service never re-checks.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

/// PostgreSQL settings. An empty DSN disables the store entirely.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dsn: String,
}

/// Kafka consumer, DLQ routing, and retry/backoff bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub dlq_topic: String,
    pub dlq_max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub dlq_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub dlq_backoff_cap: Duration,
    pub dlq_backoff_jitter: bool,
}

/// In-memory cache bounds. Zero TTL disables expiry, zero cleanup interval
/// disables the janitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_items: usize,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

/// Metrics exposition settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".into()],
            topic: "orders".into(),
            group_id: "orders-consumer".into(),
            dlq_topic: "orders.dlq".into(),
            dlq_max_retries: 3,
            dlq_backoff: Duration::from_millis(500),
            dlq_backoff_cap: Duration::from_secs(5),
            dlq_backoff_jitter: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: 10_000,
            ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "order-server".into(),
            metrics_path: "/metrics".into(),
        }
    }
}

impl Config {
    /// Load from `$CONFIG_PATH`, falling back to `./config.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "./config.yaml".into());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut cfg: Config =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        cfg.normalize();
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut cfg: Config = serde_yaml::from_str(raw)?;
        cfg.normalize();
        Ok(cfg)
    }

    /// Rewrite invalid or zero values back to their defaults.
    fn normalize(&mut self) {
        if self.server.port == 0 {
            self.server.port = 8080;
        }
        if self.server.read_timeout.is_zero() {
            self.server.read_timeout = Duration::from_secs(10);
        }
        if self.server.write_timeout.is_zero() {
            self.server.write_timeout = Duration::from_secs(10);
        }
        if self.server.idle_timeout.is_zero() {
            self.server.idle_timeout = Duration::from_secs(60);
        }
        if self.cache.max_items == 0 {
            self.cache.max_items = 10_000;
        }
        if self.kafka.dlq_topic.is_empty() && !self.kafka.topic.is_empty() {
            self.kafka.dlq_topic = format!("{}.dlq", self.kafka.topic);
        }
        if self.telemetry.service_name.is_empty() {
            self.telemetry.service_name = "order-server".into();
        }
        if self.telemetry.metrics_path.is_empty() {
            self.telemetry.metrics_path = "/metrics".into();
        }
        if !self.telemetry.metrics_path.starts_with('/') {
            self.telemetry.metrics_path = format!("/{}", self.telemetry.metrics_path);
        }
    }
}

impl ServerConfig {
    /// Listener address as `host:port`; empty host binds every interface.
    pub fn address(&self) -> String {
        if self.host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
