// Application state module
// Immutable per-process state shared by every connection

use std::sync::Arc;

use super::types::Config;
use crate::storage::{LocalPages, RemoteStore};

/// Application state
pub struct AppState {
    pub config: Config,
    pub pages: LocalPages,
    pub remote: Option<Arc<dyn RemoteStore>>,
    /// Computed once at startup, reported by `/upload-status`
    pub github_enabled: bool,
}

impl AppState {
    pub fn new(config: Config, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let pages = LocalPages::new(
            config.storage.pages_path(),
            config.storage.pages_url_prefix(),
            config.storage.manifest_name.clone(),
        );
        let github_enabled = remote.is_some();

        Self {
            config,
            pages,
            remote,
            github_enabled,
        }
    }

    pub const fn access_log(&self) -> bool {
        self.config.logging.access_log
    }
}
