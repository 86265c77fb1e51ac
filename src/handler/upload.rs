//! Upload and status endpoints
//!
//! `POST /upload` takes `{ "filename": ..., "content": ... }` and stores the page
//! on GitHub when a token is configured, locally otherwise. A failed GitHub write
//! still saves the page locally but answers 500 so the client knows the page did
//! not land where intended.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use crate::config::AppState;
use crate::http;
use crate::logger;
use crate::storage::{sanitize_filename, LocalPages, RemoteStore};

const INVALID_FILENAME: &str = "Invalid filename";
const EMPTY_CONTENT: &str = "Empty content";
const SAVE_FAILED: &str = "Failed to save file";
const REMOTE_FALLBACK: &str = "GitHub upload failed, saved locally instead";

/// JSON body returned by `POST /upload`
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UploadReply {
    Saved {
        ok: bool,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        github: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        local: Option<bool>,
    },
    Failed {
        error: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl UploadReply {
    const fn failed(error: &'static str) -> Self {
        Self::Failed {
            error,
            path: None,
            details: None,
        }
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub status: StatusCode,
    pub reply: UploadReply,
}

impl UploadOutcome {
    const fn new(status: StatusCode, reply: UploadReply) -> Self {
        Self { status, reply }
    }
}

#[derive(Debug, Serialize)]
struct UploadStatus {
    #[serde(rename = "githubEnabled")]
    github_enabled: bool,
}

/// Fields pulled from the request body; anything that isn't a JSON string is absent
#[derive(Debug, Default)]
struct UploadFields {
    filename: Option<String>,
    content: Option<String>,
}

impl UploadFields {
    fn parse(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return Self::default();
        };
        let field = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            filename: field("filename"),
            content: field("content"),
        }
    }
}

/// `POST /upload`
pub async fn handle_upload(
    req: Request<hyper::body::Incoming>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    // Only JSON bodies are read; anything else counts as an empty body
    if !is_json(req.headers()) {
        let outcome = store_upload(&[], &state.pages, state.remote.as_deref()).await;
        return http::json_response(outcome.status, &outcome.reply);
    }

    let limit = usize::try_from(state.config.http.max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!("Upload body exceeds {limit} bytes"));
            return http::build_413_response();
        }
        Err(e) => {
            // Unreadable body counts as no body at all
            logger::log_warning(&format!("Failed to read upload body: {e}"));
            Bytes::new()
        }
    };

    let outcome = store_upload(&body, &state.pages, state.remote.as_deref()).await;
    http::json_response(outcome.status, &outcome.reply)
}

/// `Content-Type` is `application/json`, parameters ignored
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Whitespace-only content, with a byte order mark counted as whitespace
fn is_blank(content: &str) -> bool {
    content
        .chars()
        .all(|c| c.is_whitespace() || c == '\u{feff}')
}

/// `GET /upload-status`
pub fn handle_status(state: &AppState) -> Response<Full<Bytes>> {
    http::json_response(
        StatusCode::OK,
        &UploadStatus {
            github_enabled: state.github_enabled,
        },
    )
}

/// Validate an upload body and persist it
pub async fn store_upload(
    body: &[u8],
    pages: &LocalPages,
    remote: Option<&dyn RemoteStore>,
) -> UploadOutcome {
    let fields = UploadFields::parse(body);

    let Some(name) = sanitize_filename(fields.filename.as_deref()) else {
        return UploadOutcome::new(StatusCode::BAD_REQUEST, UploadReply::failed(INVALID_FILENAME));
    };
    let Some(content) = fields.content.filter(|c| !is_blank(c)) else {
        return UploadOutcome::new(StatusCode::BAD_REQUEST, UploadReply::failed(EMPTY_CONTENT));
    };

    match remote {
        Some(remote) => store_remote(remote, pages, &name, &content).await,
        None => store_local(pages, &name, &content).await,
    }
}

async fn store_remote(
    remote: &dyn RemoteStore,
    pages: &LocalPages,
    name: &str,
    content: &str,
) -> UploadOutcome {
    let remote_err = match remote.put_page(name, content).await {
        Ok(()) => {
            logger::log_page_stored(name, &remote.location());
            return UploadOutcome::new(
                StatusCode::OK,
                UploadReply::Saved {
                    ok: true,
                    path: pages.public_path(name),
                    github: Some(true),
                    local: None,
                },
            );
        }
        Err(e) => e,
    };

    logger::log_remote_failure(name, &remote.location(), &remote_err);
    match pages.write_page(name, content).await {
        Ok(path) => {
            logger::log_page_stored(name, "local fallback");
            UploadOutcome::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::Failed {
                    error: REMOTE_FALLBACK,
                    path: Some(path),
                    details: Some(remote_err.to_string()),
                },
            )
        }
        Err(e) => {
            logger::log_error(&format!("Local fallback for {name} failed: {e}"));
            UploadOutcome::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::failed(SAVE_FAILED),
            )
        }
    }
}

async fn store_local(pages: &LocalPages, name: &str, content: &str) -> UploadOutcome {
    match pages.write_page(name, content).await {
        Ok(path) => {
            logger::log_page_stored(name, "local");
            UploadOutcome::new(
                StatusCode::OK,
                UploadReply::Saved {
                    ok: true,
                    path,
                    github: None,
                    local: Some(true),
                },
            )
        }
        Err(e) => {
            logger::log_error(&format!("Failed to save {name}: {e}"));
            UploadOutcome::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadReply::failed(SAVE_FAILED),
            )
        }
    }
}
