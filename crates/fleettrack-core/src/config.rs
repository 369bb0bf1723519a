//! Configuration management for the FleetTrack tracking service.
//!
//! Supports loading from YAML files, environment variable overrides
//! (`FLEETTRACK__` prefix), and validation of all settings before use.
//!
//! # Examples
//!
//! ```no_run
//! use fleettrack_core::config::AppConfig;
//!
//! let config = AppConfig::from_file("config/config.yaml").unwrap();
//! config.validate().unwrap();
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration for the tracking service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-wide settings
    #[serde(default)]
    pub app: ApplicationConfig,

    /// Real-time tracking pipeline settings
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Gateway HTTP/WebSocket server settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Durable location store backend
    #[serde(default)]
    pub storage: BackendConfig,

    /// Order service (active-delivery source) backend
    #[serde(default)]
    pub delivery: BackendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::load_failed(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration from an optional file merged with environment
    /// variables (`FLEETTRACK__SECTION__FIELD`), env taking precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let merged = builder
            .add_source(
                config::Environment::with_prefix("FLEETTRACK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                ConfigError::load_failed(
                    path.map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<env>".to_string()),
                    e.to_string(),
                )
            })?;

        merged.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tracking.max_connections == 0 {
            return Err(
                ConfigError::invalid_value("tracking.max_connections", "must be at least 1").into(),
            );
        }
        if self.tracking.batch_size == 0 {
            return Err(
                ConfigError::invalid_value("tracking.batch_size", "must be at least 1").into(),
            );
        }
        if self.tracking.batch_size > self.tracking.max_buffered {
            return Err(ConfigError::invalid_value(
                "tracking.max_buffered",
                "must be >= tracking.batch_size",
            )
            .into());
        }
        if self.api.port == 0 {
            return Err(ConfigError::invalid_value("api.port", "cannot be 0").into());
        }
        self.storage.validate("storage")?;
        self.delivery.validate("delivery")?;
        Ok(())
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_app_name() -> String {
    "fleettrack".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Settings for the real-time tracking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Maximum concurrent gateway connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Samples per batch before a size-triggered flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between timer-driven flushes, in seconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Deadline for one persistence call, in seconds
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_secs: u64,

    /// Upper bound on retained-but-unflushed samples
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,

    /// Lifetime of a cached latest position, in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Interval between cache expiry sweeps, in seconds
    #[serde(default = "default_cache_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    /// Lifetime of a cached driver/order association, in seconds
    #[serde(default = "default_assignment_ttl")]
    pub assignment_ttl_secs: u64,

    /// Lifetime of a cached "no active delivery" answer, in seconds
    #[serde(default = "default_negative_assignment_ttl")]
    pub negative_assignment_ttl_secs: u64,

    /// Deadline for one active-delivery lookup, in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Connections idle longer than this are disconnected, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Interval between idle-connection sweeps, in seconds
    #[serde(default = "default_idle_reap_interval")]
    pub idle_reap_interval_secs: u64,

    /// Shared secret gating the simulator ingestion endpoint
    #[serde(default)]
    pub simulator_secret: Option<String>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval() -> u64 {
    10
}

fn default_flush_timeout() -> u64 {
    5
}

fn default_max_buffered() -> usize {
    5000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_sweep_interval() -> u64 {
    60
}

fn default_assignment_ttl() -> u64 {
    60
}

fn default_negative_assignment_ttl() -> u64 {
    15
}

fn default_lookup_timeout_ms() -> u64 {
    1500
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_idle_reap_interval() -> u64 {
    60
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval(),
            flush_timeout_secs: default_flush_timeout(),
            max_buffered: default_max_buffered(),
            cache_ttl_secs: default_cache_ttl(),
            cache_sweep_interval_secs: default_cache_sweep_interval(),
            assignment_ttl_secs: default_assignment_ttl(),
            negative_assignment_ttl_secs: default_negative_assignment_ttl(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            idle_timeout_secs: default_idle_timeout(),
            idle_reap_interval_secs: default_idle_reap_interval(),
            simulator_secret: None,
        }
    }
}

impl TrackingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn assignment_ttl(&self) -> Duration {
        Duration::from_secs(self.assignment_ttl_secs)
    }

    pub fn negative_assignment_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_assignment_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_reap_interval(&self) -> Duration {
        Duration::from_secs(self.idle_reap_interval_secs)
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind host
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Whether to enable permissive CORS
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1MB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors: true,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backend selection for an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the collaborator service (rest backend only)
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.backend == BackendKind::Rest && self.base_url.is_none() {
            return Err(ConfigError::missing_field(format!("{section}.base_url")).into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// External collaborator backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory backend (volatile; development and tests)
    Memory,
    /// REST client against the collaborator service
    Rest,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Memory
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (tracing `EnvFilter` syntax)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.app.name, "fleettrack");
        assert_eq!(config.tracking.max_connections, 1000);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
app:
  name: fleettrack-staging
  environment: staging

tracking:
  max_connections: 250
  batch_size: 25
  flush_interval_secs: 5
  cache_ttl_secs: 120
  simulator_secret: "sim-secret"

api:
  host: 127.0.0.1
  port: 9000

storage:
  backend: rest
  base_url: "http://locations.internal:8200"

logging:
  level: debug
  format: json
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.app.environment, "staging");
        assert_eq!(config.tracking.max_connections, 250);
        assert_eq!(config.tracking.batch_size, 25);
        assert_eq!(
            config.tracking.simulator_secret.as_deref(),
            Some("sim-secret")
        );
        assert_eq!(config.api.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.storage.backend, BackendKind::Rest);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_rest_backend_requires_base_url() {
        let yaml = r#"
storage:
  backend: rest
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let yaml = r#"
tracking:
  max_connections: 0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_must_cover_batch() {
        let yaml = r#"
tracking:
  batch_size: 100
  max_buffered: 50
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let tracking = TrackingConfig::default();
        assert_eq!(tracking.flush_interval(), Duration::from_secs(10));
        assert_eq!(tracking.cache_ttl(), Duration::from_secs(300));
        assert_eq!(tracking.lookup_timeout(), Duration::from_millis(1500));
    }
}
