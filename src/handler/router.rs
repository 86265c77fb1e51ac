//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method checks, route matching,
//! response finalization and access logging.

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppState;
use crate::handler::{static_files, upload};
use crate::http;
use crate::logger::{self, AccessLogEntry};

pub const UPLOAD_PATH: &str = "/upload";
pub const STATUS_PATH: &str = "/upload-status";

/// Request context for static file serving
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
}

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let entry = state
        .access_log()
        .then(|| access_entry(&req, peer_addr));

    let mut response = route_request(req, &state).await;
    http::finalize_headers(
        &mut response,
        &state.config.http.server_name,
        state.config.http.enable_cors,
    );

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Route request based on method and path
async fn route_request(
    req: Request<hyper::body::Incoming>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => http::build_options_response(state.config.http.enable_cors),
        (&Method::POST, UPLOAD_PATH) => {
            if let Some(resp) = check_body_size(&req, state.config.http.max_body_size) {
                return resp;
            }
            upload::handle_upload(req, state).await
        }
        (&Method::POST, _) => http::build_404_response(),
        (&Method::GET | &Method::HEAD, STATUS_PATH) => upload::handle_status(state),
        (&Method::GET | &Method::HEAD, _) => {
            let if_none_match = req
                .headers()
                .get("if-none-match")
                .and_then(|v| v.to_str().ok());
            let ctx = RequestContext {
                path: &path,
                is_head: method == Method::HEAD,
                if_none_match,
            };
            static_files::serve(&ctx, Path::new(&state.config.storage.static_root)).await
        }
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            http::build_405_response()
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(
    req: &Request<hyper::body::Incoming>,
    max_body_size: u64,
) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', relying on body limit"
                ));
                None
            }
            _ => None,
        },
    )
}

fn access_entry(req: &Request<hyper::body::Incoming>, peer_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version()).to_string();
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, Config};
    use crate::storage::{RemoteError, RemoteStore};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use hyper::header::HeaderMap;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use hyper_util::rt::TokioIo;
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};

    struct RejectingRemote;

    #[async_trait]
    impl RemoteStore for RejectingRemote {
        async fn put_page(&self, _filename: &str, _content: &str) -> Result<(), RemoteError> {
            Err(RemoteError::Api {
                status: 502,
                message: "GitHub API error".to_string(),
            })
        }

        fn location(&self) -> String {
            "rejecting".to_string()
        }
    }

    async fn test_state(root: &Path, remote: Option<Arc<dyn RemoteStore>>) -> Arc<AppState> {
        let builder = config::defaults()
            .unwrap()
            .set_override("storage.static_root", root.to_str().unwrap())
            .unwrap()
            .set_override("logging.access_log", false)
            .unwrap()
            .set_override("http.max_body_size", 64)
            .unwrap();
        let cfg = Config::from_builder(builder).unwrap();
        let state = AppState::new(cfg, remote);
        state.pages.ensure_dir().await.unwrap();
        state.pages.refresh_manifest().await;
        Arc::new(state)
    }

    /// Serve exactly one connection and send `req` over it
    async fn send(state: Arc<AppState>, req: Request<Full<Bytes>>) -> (StatusCode, HeaderMap, Bytes) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let service = service_fn(move |req| handle_request(req, Arc::clone(&state), peer));
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let resp = sender.send_request(req).await.unwrap();
        let (parts, body) = resp.into_parts();
        (parts.status, parts.headers, body.collect().await.unwrap().to_bytes())
    }

    fn post_upload(body: &Value) -> Request<Full<Bytes>> {
        Request::post(UPLOAD_PATH)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::get(path).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), None).await;

        let (status, headers, body) = send(
            Arc::clone(&state),
            post_upload(&json!({"filename": "test", "content": "<h1>hi</h1>"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["access-control-allow-origin"], "*");
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply, json!({"ok": true, "path": "/pages/test.html", "local": true}));

        let (status, _, body) = send(Arc::clone(&state), get("/pages/test.html")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"<h1>hi</h1>");

        let (_, _, body) = send(state, get("/pages/list.json")).await;
        let listed: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, vec!["test.html"]);
    }

    #[tokio::test]
    async fn test_spaced_name_reachable_encoded() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), None).await;

        let (status, _, body) = send(
            Arc::clone(&state),
            post_upload(&json!({"filename": "my page", "content": "<p>m</p>"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["path"], "/pages/my page.html");

        let (status, _, body) = send(state, get("/pages/my%20page.html")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"<p>m</p>");
    }

    #[tokio::test]
    async fn test_non_json_body_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), None).await;

        let req = Request::post(UPLOAD_PATH)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(
                json!({"filename": "plain", "content": "x"}).to_string(),
            )))
            .unwrap();
        let (status, _, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], br#"{"error":"Invalid filename"}"#);
        assert!(!tmp.path().join("pages/plain.html").exists());
    }

    #[tokio::test]
    async fn test_upload_status() {
        let tmp = tempfile::tempdir().unwrap();

        let state = test_state(tmp.path(), None).await;
        let (_, _, body) = send(state, get(STATUS_PATH)).await;
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply, json!({"githubEnabled": false}));

        let state = test_state(tmp.path(), Some(Arc::new(RejectingRemote))).await;
        let (_, _, body) = send(state, get(STATUS_PATH)).await;
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply, json!({"githubEnabled": true}));
    }

    #[tokio::test]
    async fn test_remote_failure_reported_as_500() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), Some(Arc::new(RejectingRemote))).await;

        let (status, _, body) = send(
            Arc::clone(&state),
            post_upload(&json!({"filename": "page", "content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["path"], "/pages/page.html");
        assert_eq!(reply["details"], "GitHub API error");
        assert!(tmp.path().join("pages/page.html").exists());
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), None).await;

        let (status, _, body) = send(
            Arc::clone(&state),
            post_upload(&json!({"filename": "x", "content": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], br#"{"error":"Empty content"}"#);

        let big = "x".repeat(200);
        let (status, _, _) = send(
            Arc::clone(&state),
            post_upload(&json!({"filename": "big", "content": big})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!tmp.path().join("pages/big.html").exists());

        let req = Request::delete("/pages/x.html")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, _, _) = send(Arc::clone(&state), req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _, _) = send(state, get("/nope.html")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), None).await;

        let req = Request::options(UPLOAD_PATH)
            .header("origin", "http://elsewhere.example")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, headers, _) = send(state, req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("POST"));
    }
}
