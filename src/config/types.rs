// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub github: GithubConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

fn default_access_log_format() -> String {
    "combined".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    /// Seconds a connection may take to send request headers
    pub read_timeout: u64,
    pub max_connections: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Where pages live on disk and how they are exposed
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory served as static content
    pub static_root: String,
    /// Pages directory, relative to `static_root`
    pub pages_dir: String,
    /// Manifest file name inside the pages directory
    pub manifest_name: String,
}

impl StorageConfig {
    pub fn pages_path(&self) -> PathBuf {
        PathBuf::from(&self.static_root).join(&self.pages_dir)
    }

    /// URL prefix under which the pages directory is reachable, e.g. `/pages`
    pub fn pages_url_prefix(&self) -> String {
        format!("/{}", self.pages_dir.trim_matches('/'))
    }
}

/// Remote repository backend settings
///
/// The backend is considered enabled only when a non-empty token is present.
#[derive(Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    pub branch: String,
    pub api_url: String,
    /// Seconds allowed for each GitHub API request
    pub timeout: u64,
}

impl GithubConfig {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.token().is_some()
    }
}

// Keeps the token out of debug output
impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &self.token().map(|_| "<redacted>"))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
