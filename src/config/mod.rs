// Configuration module entry point
// Loads layered configuration and holds the immutable runtime state

mod state;
mod types;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{Config, GithubConfig};

/// Conventional environment variables mapped onto config keys
const ENV_OVERRIDES: [(&str, &str); 5] = [
    ("PORT", "server.port"),
    ("GITHUB_TOKEN", "github.token"),
    ("GITHUB_OWNER", "github.owner"),
    ("GITHUB_REPO", "github.repo"),
    ("GITHUB_BRANCH", "github.branch"),
];

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let mut builder = defaults()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("UPLOADER")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        Self::from_builder(builder)
    }

    /// Deserialize and validate a fully layered builder
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.github.is_enabled()
            && (self.github.owner.trim().is_empty() || self.github.repo.trim().is_empty())
        {
            return Err(ConfigError::Message(
                "github.token is set but github.owner or github.repo is empty".to_string(),
            ));
        }
        if self.storage.pages_dir.trim_matches('/').is_empty() {
            return Err(ConfigError::Message(
                "storage.pages_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

/// Builder pre-populated with every default
pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("logging.access_log_format", "combined")?
        .set_default("performance.keep_alive_timeout", 75)?
        .set_default("performance.read_timeout", 30)?
        .set_default("http.server_name", "page-uploader/0.1")?
        .set_default("http.enable_cors", true)?
        .set_default("http.max_body_size", 5_242_880)? // 5MB
        .set_default("storage.static_root", ".")?
        .set_default("storage.pages_dir", "pages")?
        .set_default("storage.manifest_name", "list.json")?
        .set_default("github.owner", "")?
        .set_default("github.repo", "")?
        .set_default("github.branch", "main")?
        .set_default("github.api_url", "https://api.github.com")?
        .set_default("github.timeout", 20)
}
