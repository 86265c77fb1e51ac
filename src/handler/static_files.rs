//! Static file serving module
//!
//! Serves the static root (the working directory by default), which includes the
//! uploaded pages and their `list.json` manifest.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::handler::router::RequestContext;
use crate::http::{self, content};
use crate::logger;

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Serve a `GET`/`HEAD` request from `root`
pub async fn serve(ctx: &RequestContext<'_>, root: &Path) -> Response<Full<Bytes>> {
    let Some(file_path) = resolve(root, ctx.path).await else {
        return http::build_404_response();
    };

    let data = match fs::read(&file_path).await {
        Ok(d) => d,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {e}",
                file_path.display()
            ));
            return http::build_404_response();
        }
    };

    let etag = content::generate_etag(&data);
    if content::etag_matches(ctx.if_none_match, &etag) {
        return http::build_304_response(&etag);
    }

    let content_type = content::content_type(file_path.extension().and_then(|e| e.to_str()));
    http::build_file_response(Bytes::from(data), content_type, &etag, ctx.is_head)
}

/// Map a request path onto a regular file under `root`
///
/// Returns `None` when nothing servable exists or the path escapes `root`.
async fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let Some(relative) = decode_path(request_path) else {
        logger::log_warning(&format!("Path traversal attempt blocked: {request_path}"));
        return None;
    };

    let root_canonical = match fs::canonicalize(root).await {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static root not found or inaccessible '{}': {e}",
                root.display()
            ));
            return None;
        }
    };

    let mut candidate = root_canonical.join(relative);
    if fs::metadata(&candidate).await.ok()?.is_dir() {
        candidate = find_index(&candidate).await?;
    }

    // Symlinks may still point outside the root
    let canonical = fs::canonicalize(&candidate).await.ok()?;
    if !canonical.starts_with(&root_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {request_path} -> {}",
            canonical.display()
        ));
        return None;
    }
    Some(canonical)
}

/// Percent-decode a request path into a relative path, one segment at a time
///
/// Returns `None` for `..` segments and for segments that decode to a separator
/// or NUL. Empty and `.` segments are dropped.
fn decode_path(request_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for raw in request_path.split('/') {
        let segment = percent_decode_str(raw).decode_utf8().ok()?;
        if segment == ".." || segment.contains(['/', '\\', '\0']) {
            return None;
        }
        if !segment.is_empty() && segment != "." {
            relative.push(&*segment);
        }
    }
    Some(relative)
}

async fn find_index(dir: &Path) -> Option<PathBuf> {
    for name in INDEX_FILES {
        let path = dir.join(name);
        if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            return Some(path);
        }
    }
    None
}
