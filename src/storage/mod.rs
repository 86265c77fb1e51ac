//! Page storage module
//!
//! Two persistence targets for uploaded pages:
//! - `local`: the on-disk pages directory plus its `list.json` manifest
//! - `github`: a repository reached through the GitHub contents API
//!
//! The upload handler always has the local backend; the remote one is optional
//! and sits behind the [`RemoteStore`] trait.

pub mod filename;
pub mod github;
pub mod local;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub use filename::sanitize_filename;
pub use github::GithubClient;
pub use local::LocalPages;

/// Local backend failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Remote backend failures
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid GitHub API url: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    /// Non-success answer; `message` is the API's own text when it sent one
    #[error("{message}")]
    Api { status: u16, message: String },
}

impl RemoteError {
    /// HTTP status of an API rejection
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::InvalidUrl(_) | Self::Transport(_) => None,
        }
    }
}

/// A remote place pages can be pushed to
///
/// One call is one attempt: implementations never retry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or overwrite `pages/<filename>` with `content`
    async fn put_page(&self, filename: &str, content: &str) -> Result<(), RemoteError>;

    /// Human-readable target, used in logs
    fn location(&self) -> String;
}
