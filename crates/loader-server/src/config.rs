//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8088;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/loader";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default attempt cap for the startup readiness gate.
pub const DEFAULT_DATABASE_STARTUP_ATTEMPTS: u32 = 10;

/// Default initial backoff delay for the startup readiness gate.
pub const DEFAULT_DATABASE_STARTUP_INITIAL_DELAY_MS: u64 = 500;

/// Default backoff delay ceiling for the startup readiness gate.
pub const DEFAULT_DATABASE_STARTUP_MAX_DELAY_MS: u64 = 30_000;

/// Default base directory for staged content.
pub const DEFAULT_STAGING_BASE_DIR: &str = "/tmp/loader";

/// Default Zenodo API base URL.
pub const DEFAULT_ZENODO_API_BASE_URL: &str = "https://zenodo.org/api";

/// Default Zenodo record base URL (used to construct file download URLs).
pub const DEFAULT_ZENODO_RECORD_BASE_URL: &str = "https://zenodo.org";

/// Default allow-list of share URL hosts.
pub const DEFAULT_ZENODO_ALLOWED_HOSTS: &str =
    "zenodo.org,www.zenodo.org,sandbox.zenodo.org,doi.org,dx.doi.org";

/// Default remote download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Default number of download attempts for transient transport failures.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;

/// Default metadata extraction container image.
pub const DEFAULT_EXTRACTION_IMAGE: &str = "reproserve/compendium-meta:latest";

/// Default bind target for the staged compendium inside the container.
pub const DEFAULT_EXTRACTION_BIND_TARGET: &str = "/compendium";

/// Default extraction container runtime cap in seconds.
pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 600;

/// Default container runtime binary.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub staging: StagingConfig,
    pub zenodo: ZenodoConfig,
    pub extraction: ExtractionConfig,
    pub notify: NotifyConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration, including the startup readiness gate caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub startup_attempts: u32,
    pub startup_initial_delay_ms: u64,
    pub startup_max_delay_ms: u64,
}

/// Filesystem staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub base_dir: PathBuf,
}

impl StagingConfig {
    /// Directory receiving raw uploads before a compendium id exists.
    pub fn incoming_dir(&self) -> PathBuf {
        self.base_dir.join("incoming")
    }

    /// Directory holding staged content, one subdirectory per compendium id.
    pub fn compendium_dir(&self) -> PathBuf {
        self.base_dir.join("compendium")
    }
}

/// Zenodo repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZenodoConfig {
    pub api_base_url: String,
    pub record_base_url: String,
    pub allowed_hosts: Vec<String>,
    pub download_timeout_secs: u64,
    pub download_retries: u32,
}

/// Metadata extraction container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub image: String,
    pub bind_target: String,
    pub runtime_timeout_secs: u64,
    pub docker_binary: String,
}

/// Notification side-channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("LOADER_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("LOADER_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "LOADER_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                startup_attempts: env_parse(
                    "DATABASE_STARTUP_ATTEMPTS",
                    DEFAULT_DATABASE_STARTUP_ATTEMPTS,
                ),
                startup_initial_delay_ms: env_parse(
                    "DATABASE_STARTUP_INITIAL_DELAY_MS",
                    DEFAULT_DATABASE_STARTUP_INITIAL_DELAY_MS,
                ),
                startup_max_delay_ms: env_parse(
                    "DATABASE_STARTUP_MAX_DELAY_MS",
                    DEFAULT_DATABASE_STARTUP_MAX_DELAY_MS,
                ),
            },
            staging: StagingConfig {
                base_dir: std::env::var("STAGING_BASE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_BASE_DIR)),
            },
            zenodo: ZenodoConfig {
                api_base_url: std::env::var("ZENODO_API_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_ZENODO_API_BASE_URL.to_string()),
                record_base_url: std::env::var("ZENODO_RECORD_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_ZENODO_RECORD_BASE_URL.to_string()),
                allowed_hosts: std::env::var("ZENODO_ALLOWED_HOSTS")
                    .unwrap_or_else(|_| DEFAULT_ZENODO_ALLOWED_HOSTS.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                download_timeout_secs: env_parse(
                    "DOWNLOAD_TIMEOUT_SECS",
                    DEFAULT_DOWNLOAD_TIMEOUT_SECS,
                ),
                download_retries: env_parse("DOWNLOAD_RETRIES", DEFAULT_DOWNLOAD_RETRIES),
            },
            extraction: ExtractionConfig {
                image: std::env::var("EXTRACTION_IMAGE")
                    .unwrap_or_else(|_| DEFAULT_EXTRACTION_IMAGE.to_string()),
                bind_target: std::env::var("EXTRACTION_BIND_TARGET")
                    .unwrap_or_else(|_| DEFAULT_EXTRACTION_BIND_TARGET.to_string()),
                runtime_timeout_secs: env_parse(
                    "EXTRACTION_TIMEOUT_SECS",
                    DEFAULT_EXTRACTION_TIMEOUT_SECS,
                ),
                docker_binary: std::env::var("DOCKER_BINARY")
                    .unwrap_or_else(|_| DEFAULT_DOCKER_BINARY.to_string()),
            },
            notify: NotifyConfig {
                enabled: env_parse("NOTIFY_ENABLED", false),
                webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.database.startup_attempts == 0 {
            anyhow::bail!("Database startup_attempts must be at least 1");
        }

        if self.zenodo.allowed_hosts.is_empty() {
            anyhow::bail!("Zenodo allowed_hosts cannot be empty");
        }

        if self.zenodo.download_retries == 0 {
            anyhow::bail!("Download retries must be at least 1");
        }

        if self.extraction.image.is_empty() {
            anyhow::bail!("Extraction image cannot be empty");
        }

        if self.notify.enabled && self.notify.webhook_url.is_none() {
            anyhow::bail!("NOTIFY_WEBHOOK_URL is required when notifications are enabled");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                startup_attempts: DEFAULT_DATABASE_STARTUP_ATTEMPTS,
                startup_initial_delay_ms: DEFAULT_DATABASE_STARTUP_INITIAL_DELAY_MS,
                startup_max_delay_ms: DEFAULT_DATABASE_STARTUP_MAX_DELAY_MS,
            },
            staging: StagingConfig {
                base_dir: PathBuf::from(DEFAULT_STAGING_BASE_DIR),
            },
            zenodo: ZenodoConfig {
                api_base_url: DEFAULT_ZENODO_API_BASE_URL.to_string(),
                record_base_url: DEFAULT_ZENODO_RECORD_BASE_URL.to_string(),
                allowed_hosts: DEFAULT_ZENODO_ALLOWED_HOSTS
                    .split(',')
                    .map(|s| s.to_string())
                    .collect(),
                download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
                download_retries: DEFAULT_DOWNLOAD_RETRIES,
            },
            extraction: ExtractionConfig {
                image: DEFAULT_EXTRACTION_IMAGE.to_string(),
                bind_target: DEFAULT_EXTRACTION_BIND_TARGET.to_string(),
                runtime_timeout_secs: DEFAULT_EXTRACTION_TIMEOUT_SECS,
                docker_binary: DEFAULT_DOCKER_BINARY.to_string(),
            },
            notify: NotifyConfig {
                enabled: false,
                webhook_url: None,
            },
        }
    }
}
