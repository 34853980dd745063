//! Configuration management for brickgate.
//!
//! Handles loading configuration from TOML files and environment variables
//! for the warehouse connection and the HTTP listener.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Main configuration structure for brickgate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Warehouse connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:8080`.
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Warehouse connection configuration.
///
/// Built once at startup and shared read-only by every request.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Workspace host, with or without an `https://` scheme.
    pub host: Option<String>,

    /// Warehouse HTTP path, e.g. `/sql/1.0/warehouses/abc123`.
    pub http_path: Option<String>,

    /// Catalog injected into caller statements and used for discovery.
    pub catalog: Option<String>,

    /// Personal access token (not recommended to store in config).
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Row cap appended as `LIMIT`; 0 disables it.
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,

    /// Per-statement timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient warehouse failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause between retries, in seconds.
    #[serde(default)]
    pub pause_secs: u64,

    /// Upper bound on the time spent retrying one request, in seconds.
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,
}

fn default_max_rows() -> u64 {
    10_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    5
}

fn default_retry_timeout_secs() -> u64 {
    40
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            http_path: None,
            catalog: None,
            token: None,
            max_rows: default_max_rows(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            pause_secs: 0,
            retry_timeout_secs: default_retry_timeout_secs(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("http_path", &self.http_path)
            .field("catalog", &self.catalog)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_rows", &self.max_rows)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .field("pause_secs", &self.pause_secs)
            .field("retry_timeout_secs", &self.retry_timeout_secs)
            .finish()
    }
}

impl ConnectionConfig {
    /// Statement timeout as a duration.
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause between retry attempts.
    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    /// Total time budget for retrying one request.
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    /// Configured catalog, or an empty string when unset.
    pub fn catalog_name(&self) -> &str {
        self.catalog.as_deref().unwrap_or_default()
    }

    /// Checks the fields required to open a connection and that the
    /// statement timeout is non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.host.as_deref().map_or(true, str::is_empty) {
            return Err(BridgeError::config("Host is required"));
        }
        if self.http_path.as_deref().map_or(true, str::is_empty) {
            return Err(BridgeError::config("HTTP path is required"));
        }
        if self.catalog_name().is_empty() {
            return Err(BridgeError::config("Catalog is required"));
        }
        if self.timeout_secs == 0 {
            return Err(BridgeError::config("Statement timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// Workspace base URL, defaulting to `https://` when no scheme is given.
    pub fn base_url(&self) -> Result<Url> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| BridgeError::config("Host is required"))?;

        let with_scheme = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        Url::parse(&with_scheme).map_err(|e| BridgeError::config(format!("Invalid host: {e}")))
    }

    /// Warehouse id, taken from the last segment of the HTTP path.
    pub fn warehouse_id(&self) -> Result<String> {
        self.http_path
            .as_deref()
            .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(String::from)
            .ok_or_else(|| BridgeError::config("HTTP path does not name a warehouse"))
    }

    /// Applies environment variables (BRICKGATE_HOST, etc.) as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.host.is_none() {
            self.host = std::env::var("BRICKGATE_HOST").ok();
        }
        if self.http_path.is_none() {
            self.http_path = std::env::var("BRICKGATE_HTTP_PATH").ok();
        }
        if self.catalog.is_none() {
            self.catalog = std::env::var("BRICKGATE_CATALOG").ok();
        }
        if self.token.is_none() {
            self.token = std::env::var("BRICKGATE_TOKEN").ok();
        }
    }

    /// Returns a display-safe string (no token) for log output.
    pub fn display_string(&self) -> String {
        let host = self.host.as_deref().unwrap_or("<no host>");
        let catalog = self.catalog.as_deref().unwrap_or("<no catalog>");
        let path = self.http_path.as_deref().unwrap_or("");
        format!("{catalog} @ {host}{path}")
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("brickgate")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            BridgeError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
