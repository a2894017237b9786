//! Configuration for Mailcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "MAILCAST_CONFIG";

/// Prefix for environment overrides (`MAILCAST_SMTP__HOST=...`)
pub const ENV_PREFIX: &str = "MAILCAST";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Fallback SMTP credentials, used when a user has no sender address
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Open/click tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Campaign scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Outbound webhook configuration
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Public base URL of this API, used for tracking links
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Public base URL of the front-end, used for unsubscribe links
    #[serde(default = "default_client_base_url")]
    pub client_base_url: String,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_base_url: default_api_base_url(),
            client_base_url: default_client_base_url(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_client_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

fn default_jwt_secret() -> String {
    "change-me".to_string()
}

/// Fallback SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host; no fallback transport is available when unset
    pub host: Option<String>,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Use implicit TLS
    #[serde(default)]
    pub tls: bool,

    /// Username for SMTP AUTH
    pub username: Option<String>,

    /// Password for SMTP AUTH
    pub password: Option<String>,

    /// From address used with the fallback relay
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Display name used with the fallback relay
    pub from_name: Option<String>,

    /// Send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            tls: false,
            username: None,
            password: None,
            from_address: default_from_address(),
            from_name: None,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Secret used to sign tracking tokens
    #[serde(default = "default_tracking_secret")]
    pub secret: String,

    /// Inject the open pixel and rewrite links
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            secret: default_tracking_secret(),
            enabled: true,
        }
    }
}

fn default_tracking_secret() -> String {
    "change-me-too".to_string()
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the scheduled campaign poller
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum due campaigns handled per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Concurrent sends within one campaign dispatch
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// Age after which a campaign still in `sending` is reported
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,

    /// Move stuck campaigns to `failed` instead of only reporting them
    #[serde(default)]
    pub fail_stuck: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            send_concurrency: default_send_concurrency(),
            stuck_after_secs: default_stuck_after_secs(),
            fail_stuck: false,
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> i64 {
    10
}

fn default_send_concurrency() -> usize {
    5
}

fn default_stuck_after_secs() -> u64 {
    3600
}

/// Outbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// Permit private and loopback targets (development only)
    #[serde(default)]
    pub allow_private_targets: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
            allow_private_targets: false,
        }
    }
}

fn default_webhook_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first file found, layered with
    /// `MAILCAST_`-prefixed environment variables
    pub fn load() -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = Self::locate_file() {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load configuration: {}", e)))
    }

    fn locate_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailcast/config.toml"),
        ]
        .into_iter()
        .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_address, "0.0.0.0:8080");

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.interval_secs, 60);
        assert_eq!(scheduler.batch_size, 10);
        assert!(!scheduler.fail_stuck);

        let smtp = SmtpConfig::default();
        assert!(smtp.host.is_none());
        assert_eq!(smtp.port, 587);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
api_base_url = "https://api.example.com"
client_base_url = "https://app.example.com"

[database]
url = "postgres://localhost/mailcast"

[smtp]
host = "smtp.example.com"
port = 465
tls = true
from_address = "hello@example.com"
from_name = "Example"

[scheduler]
send_concurrency = 1
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.client_base_url, "https://app.example.com");
        assert_eq!(config.database.url, "postgres://localhost/mailcast");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.smtp.host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.smtp.port, 465);
        assert!(config.smtp.tls);
        assert_eq!(config.scheduler.send_concurrency, 1);
        assert_eq!(config.scheduler.interval_secs, 60);
        assert!(config.tracking.enabled);
    }

    #[test]
    fn test_database_section_required() {
        let result: std::result::Result<Config, _> = toml::from_str("[server]\n");
        assert!(result.is_err());
    }
}
