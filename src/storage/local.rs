//! Local pages directory and its manifest
//!
//! The manifest is never patched in place: every regeneration rescans the whole
//! directory and rewrites the file. That keeps it consistent with the disk at the
//! cost of a full listing per write, which is fine for a modest page count.

use std::path::{Path, PathBuf};
use tokio::fs;

use super::filename::is_page_name;
use super::StorageError;
use crate::logger;

/// On-disk page store
#[derive(Debug, Clone)]
pub struct LocalPages {
    dir: PathBuf,
    url_prefix: String,
    manifest_name: String,
}

impl LocalPages {
    pub fn new(dir: PathBuf, url_prefix: String, manifest_name: String) -> Self {
        Self {
            dir,
            url_prefix,
            manifest_name,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_name)
    }

    /// Public URL path of a stored page, e.g. `/pages/test.html`
    pub fn public_path(&self, name: &str) -> String {
        format!("{}/{name}", self.url_prefix)
    }

    /// Create the pages directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))
    }

    /// Write a page (overwriting any previous version) and refresh the manifest
    ///
    /// `name` must already be sanitized. Only the page write can fail; manifest
    /// problems are logged and swallowed.
    pub async fn write_page(&self, name: &str, content: &str) -> Result<String, StorageError> {
        let path = self.dir.join(name);
        fs::write(&path, content)
            .await
            .map_err(|source| io_error(&path, source))?;

        self.refresh_manifest().await;
        Ok(self.public_path(name))
    }

    /// Page names currently in the directory, sorted
    pub async fn list_pages(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.dir, source))?
        {
            // Non-UTF-8 names can't be listed in JSON faithfully
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_page_name(&name) {
                pages.push(name);
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// Rescan the directory and rewrite the manifest
    pub async fn regenerate_manifest(&self) -> Result<Vec<String>, StorageError> {
        let pages = self.list_pages().await?;
        let json = serde_json::to_string_pretty(&pages)?;
        let path = self.manifest_path();
        fs::write(&path, json)
            .await
            .map_err(|source| io_error(&path, source))?;
        Ok(pages)
    }

    /// Regenerate the manifest, logging instead of failing
    pub async fn refresh_manifest(&self) {
        match self.regenerate_manifest().await {
            Ok(pages) => logger::log_manifest_updated(pages.len()),
            Err(e) => logger::log_warning(&format!("Could not regenerate pages list: {e}")),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
