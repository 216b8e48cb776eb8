//! Configuration management for the tenantry server.
//!
//! Configuration is layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which take
//! precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use tenantry_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("tenantry.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tenantry_domain::{BatchConfig, CacheConfig};

/// Environment variable prefix, e.g. `TENANTRY_SERVER__PORT`.
pub const ENV_PREFIX: &str = "TENANTRY";

/// Upper bound for `server.request_timeout_secs` (one hour).
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Tenant resource cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Request batching settings
    #[serde(default)]
    pub batch: BatchSettings,

    /// Product backend settings
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix the product API is mounted under
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_endpoint() -> String {
    "/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Tenant resource cache settings.
///
/// ```yaml
/// cache:
///   idle_ttl_ms: 1000
///   sweep_interval_ms: 250
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// How long an unused tenant bundle is kept after its last use.
    ///
    /// Environment variable: `TENANTRY_CACHE__IDLE_TTL_MS`
    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,

    /// How often idle bundles are looked for.
    ///
    /// Environment variable: `TENANTRY_CACHE__SWEEP_INTERVAL_MS`
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            idle_ttl_ms: default_idle_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_idle_ttl_ms() -> u64 {
    1000
}

fn default_sweep_interval_ms() -> u64 {
    250
}

/// Request batching settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchSettings {
    /// Coalescing window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum distinct ids per backend call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_window_ms() -> u64 {
    2
}

fn default_max_batch_size() -> usize {
    100
}

/// Product backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteSettings {
    /// Backend type. Only "memory" is available.
    #[serde(default = "default_remote_backend")]
    pub backend: String,

    /// Simulated round-trip time of the memory backend in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            backend: default_remote_backend(),
            latency_ms: 0,
        }
    }
}

fn default_remote_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Expose the Prometheus endpoint at `/metrics`
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `TENANTRY_` and use `__` as
    /// the nested key separator, e.g. `TENANTRY_CACHE__IDLE_TTL_MS=5000`
    /// overrides `cache.idle_ttl_ms`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from defaults and `TENANTRY_` environment
    /// variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.server.request_timeout_secs == 0
            || self.server.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(invalid(format!(
                "server.request_timeout_secs must be between 1 and {}, got: {}",
                MAX_REQUEST_TIMEOUT_SECS, self.server.request_timeout_secs
            )));
        }

        if !self.server.endpoint.starts_with('/') || self.server.endpoint.len() < 2 {
            return Err(invalid(format!(
                "server.endpoint must be a path like '/v1', got: {}",
                self.server.endpoint
            )));
        }

        if self.cache.idle_ttl_ms == 0 {
            return Err(invalid("cache.idle_ttl_ms must be greater than 0"));
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(invalid("cache.sweep_interval_ms must be greater than 0"));
        }

        if self.batch.max_batch_size == 0 {
            return Err(invalid("batch.max_batch_size must be greater than 0"));
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.remote.backend.as_str()) {
            return Err(invalid(format!(
                "remote.backend must be one of: {:?}, got: {}",
                valid_backends, self.remote.backend
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    /// Tenant cache settings as a [`CacheConfig`].
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_idle_ttl(Duration::from_millis(self.cache.idle_ttl_ms))
            .with_sweep_interval(Duration::from_millis(self.cache.sweep_interval_ms))
    }

    /// Batching settings as a [`BatchConfig`].
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::default()
            .with_window(Duration::from_millis(self.batch.window_ms))
            .with_max_batch_size(self.batch.max_batch_size)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
