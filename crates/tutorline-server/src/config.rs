//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (first match of [`CONFIG_PATHS`], or `--config <path>`)
//! - Environment variables (`TUTORLINE__SECTION__KEY`, layered on top)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tutorline_core::SessionConfig;

/// Files searched by [`Config::load`], in order.
pub const CONFIG_PATHS: [&str; 3] = [
    "tutorline.toml",
    "/etc/tutorline/tutorline.toml",
    "~/.config/tutorline/tutorline.toml",
];

const ENV_PREFIX: &str = "TUTORLINE";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Token and cookie settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Persistence backend.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cross-origin settings for browser clients.
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Messages a connection may have queued before it is evicted.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum message content length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign tokens. Must be set.
    #[serde(default)]
    pub jwt_secret: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Name of the cookie carrying the token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; everything is lost on restart.
    #[default]
    Memory,
    /// PostgreSQL via `database_url`.
    Postgres,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Connection string for the postgres backend.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Pool size for the postgres backend.
    #[serde(default = "default_db_connections")]
    pub max_connections: u32,
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API with credentials.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_content_length() -> usize {
    4096
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_heartbeat_timeout() -> u64 {
    60_000 // 60 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_token_ttl() -> u64 {
    30 * 24 * 60 * 60 // 30 days
}

fn default_cookie_name() -> String {
    "token".to_string()
}

fn default_db_connections() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            outbox_capacity: default_outbox_capacity(),
            max_message_size: default_max_message_size(),
            max_content_length: default_max_content_length(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: None,
            max_connections: default_db_connections(),
        }
    }
}

impl Config {
    /// Load configuration from the first existing default path, with
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());

        Self::layered(file.as_deref())
    }

    /// Load a specific file, with environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let path = path.to_string_lossy();
        Self::layered(Some(path.as_ref()))
    }

    fn layered(file: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = file {
            tracing::debug!(path, "Loading config file");
            builder = builder.add_source(
                ::config::File::with_name(path).format(::config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret must be set (TUTORLINE__AUTH__JWT_SECRET)");
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            bail!("storage.database_url is required for the postgres backend");
        }
        if self.heartbeat.timeout_ms <= self.heartbeat.interval_ms {
            bail!("heartbeat.timeout_ms must be greater than heartbeat.interval_ms");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Per-connection settings for the chat hub.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            outbox_capacity: self.limits.outbox_capacity,
            heartbeat_interval: Duration::from_millis(self.heartbeat.interval_ms),
            idle_timeout: Duration::from_millis(self.heartbeat.timeout_ms),
            max_content_length: self.limits.max_content_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.outbox_capacity, 256);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.auth.cookie_name, "token");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let config = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!(
            "tutorline-config-{}-{}.toml",
            std::process::id(),
            line!()
        ));
        std::fs::write(
            &path,
            r#"
            port = 9100

            [auth]
            jwt_secret = "from-file"

            [limits]
            max_connections = 7
            "#,
        )
        .unwrap();

        let loaded = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.limits.max_connections, 7);
        assert_eq!(config.transport.websocket_path, "/ws");

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            outbox_capacity = 32

            [storage]
            backend = "postgres"
            database_url = "postgres://localhost/tutorline"

            [cors]
            allowed_origins = ["http://localhost:3000"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.outbox_capacity, 32);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.cors.allowed_origins, ["http://localhost:3000"]);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "secret".into();
        assert!(config.validate().is_ok());

        config.storage.backend = StorageBackend::Postgres;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_config() {
        let session = Config::default().session();
        assert_eq!(session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(session.idle_timeout, Duration::from_secs(60));
        assert_eq!(session.outbox_capacity, 256);
    }
}
