//! GitHub contents API backend
//!
//! Each upload is exactly one `GET` (to learn the current blob `sha`, if any)
//! followed by one `PUT`. The pair is not atomic: a commit landing in between
//! makes the `PUT` fail with a conflict, which surfaces as an ordinary error.
//! Whoever writes last wins; nothing here retries.

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RemoteError, RemoteStore};
use crate::config::GithubConfig;
use crate::logger;

const REMOTE_DIR: &str = "pages";
const USER_AGENT: &str = concat!("page-uploader/", env!("CARGO_PKG_VERSION"));
const GENERIC_FAILURE: &str = "GitHub API error";

/// Body of the contents `PUT`
#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    branch: &'a str,
    /// Present when updating an existing file, absent when creating one
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsMeta {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

/// Client for one repository/branch pair
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_url: Url,
    token: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GithubClient {
    /// Build a client; `None` when no token is configured
    pub fn from_config(cfg: &GithubConfig) -> Result<Option<Self>, RemoteError> {
        let Some(token) = cfg.token() else {
            return Ok(None);
        };

        let api_url = Url::parse(&cfg.api_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", cfg.api_url)))?;
        if api_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(cfg.api_url.clone()));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(cfg.timeout))
            .build()?;

        Ok(Some(Self {
            client,
            api_url,
            token: token.to_string(),
            owner: cfg.owner.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
        }))
    }

    /// `{api}/repos/{owner}/{repo}/contents/pages/{filename}`, segments percent-encoded
    fn contents_url(&self, filename: &str) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "repos",
                self.owner.as_str(),
                self.repo.as_str(),
                "contents",
                REMOTE_DIR,
                filename,
            ]);
        }
        url
    }

    /// Current blob `sha` of the file, or `None` if it is missing or unreadable
    async fn fetch_sha(&self, url: &Url) -> Option<String> {
        let mut url = url.clone();
        url.query_pairs_mut().append_pair("ref", &self.branch);

        let response = match self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                logger::log_warning(&format!("GitHub metadata fetch failed: {e}"));
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }
        response.json::<ContentsMeta>().await.ok().map(|m| m.sha)
    }
}

#[async_trait]
impl RemoteStore for GithubClient {
    async fn put_page(&self, filename: &str, content: &str) -> Result<(), RemoteError> {
        let url = self.contents_url(filename);
        let sha = self.fetch_sha(&url).await;
        let body = build_put_body(filename, content, &self.branch, sha);

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Error bodies are best-effort; fall back to a fixed message
        let message = response
            .json::<ApiMessage>()
            .await
            .ok()
            .and_then(|m| m.message)
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        Err(RemoteError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn location(&self) -> String {
        format!("github:{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

fn commit_message(filename: &str) -> String {
    format!("Add/update page {filename}")
}

fn build_put_body<'a>(
    filename: &str,
    content: &str,
    branch: &'a str,
    sha: Option<String>,
) -> PutContents<'a> {
    PutContents {
        message: commit_message(filename),
        content: BASE64_STANDARD.encode(content.as_bytes()),
        branch,
        sha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::{Bytes, Incoming};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Method, Request, Response};
    use hyper_util::rt::TokioIo;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn config(token: Option<&str>) -> GithubConfig {
        GithubConfig {
            token: token.map(ToString::to_string),
            owner: "octo".to_string(),
            repo: "site".to_string(),
            branch: "main".to_string(),
            api_url: "https://api.github.com".to_string(),
            timeout: 20,
        }
    }

    #[test]
    fn test_no_token_no_client() {
        assert!(GithubClient::from_config(&config(None)).unwrap().is_none());
        assert!(GithubClient::from_config(&config(Some(""))).unwrap().is_none());
    }

    #[test]
    fn test_invalid_api_url() {
        let mut cfg = config(Some("t"));
        cfg.api_url = "not a url".to_string();
        assert!(matches!(
            GithubClient::from_config(&cfg),
            Err(RemoteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_contents_url() {
        let client = GithubClient::from_config(&config(Some("t"))).unwrap().unwrap();
        assert_eq!(
            client.contents_url("test.html").as_str(),
            "https://api.github.com/repos/octo/site/contents/pages/test.html"
        );
        assert_eq!(
            client.contents_url("my page.html").as_str(),
            "https://api.github.com/repos/octo/site/contents/pages/my%20page.html"
        );
        assert_eq!(client.location(), "github:octo/site@main");
    }

    #[test]
    fn test_contents_url_with_api_prefix() {
        let mut cfg = config(Some("t"));
        cfg.api_url = "https://ghe.example.com/api/v3/".to_string();
        let client = GithubClient::from_config(&cfg).unwrap().unwrap();
        assert_eq!(
            client.contents_url("a.html").as_str(),
            "https://ghe.example.com/api/v3/repos/octo/site/contents/pages/a.html"
        );
    }

    #[test]
    fn test_create_body_has_no_sha() {
        let body = build_put_body("test.html", "<h1>hi</h1>", "main", None);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "Add/update page test.html");
        assert_eq!(json["content"], "PGgxPmhpPC9oMT4=");
        assert_eq!(json["branch"], "main");
        assert!(json.get("sha").is_none());
    }

    #[test]
    fn test_update_body_carries_sha() {
        let body = build_put_body("test.html", "x", "gh-pages", Some("abc123".to_string()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sha"], "abc123");
        assert_eq!(json["branch"], "gh-pages");
    }

    #[test]
    fn test_content_is_utf8_safe() {
        let body = build_put_body("u.html", "héllo ✓", "main", None);
        let decoded = BASE64_STANDARD.decode(body.content).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "héllo ✓");
    }

    /// One request as seen by the fake contents API
    #[derive(Debug)]
    struct Seen {
        method: Method,
        uri: String,
        auth: Option<String>,
        body: Value,
    }

    /// Canned answer for one method
    #[derive(Clone, Copy)]
    struct Answer {
        status: u16,
        body: &'static str,
        delay: Duration,
    }

    const fn answer(status: u16, body: &'static str) -> Answer {
        Answer {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    /// Serve a fake contents API on loopback; returns its base URL and request log
    async fn fake_api(get: Answer, put: Answer) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                let service = service_fn(move |req: Request<Incoming>| {
                    let log = Arc::clone(&log);
                    async move {
                        let method = req.method().clone();
                        let uri = req.uri().to_string();
                        let auth = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(ToString::to_string);
                        let raw = req.into_body().collect().await?.to_bytes();
                        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);
                        let reply = if method == Method::GET { get } else { put };
                        log.lock().unwrap().push(Seen {
                            method,
                            uri,
                            auth,
                            body,
                        });

                        tokio::time::sleep(reply.delay).await;
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(reply.status)
                                .header("content-type", "application/json")
                                .body(Full::new(Bytes::from_static(reply.body.as_bytes())))
                                .unwrap(),
                        )
                    }
                });
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn client_for(api_url: String, timeout: u64) -> GithubClient {
        let cfg = GithubConfig {
            token: Some("ghp_test".to_string()),
            owner: "octo".to_string(),
            repo: "site".to_string(),
            branch: "gh-pages".to_string(),
            api_url,
            timeout,
        };
        GithubClient::from_config(&cfg).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_update_sends_fetched_sha() {
        let (url, seen) =
            fake_api(answer(200, r#"{"sha":"abc123"}"#), answer(200, "{}")).await;
        let client = client_for(url, 5);

        client.put_page("x.html", "hi").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].uri, "/repos/octo/site/contents/pages/x.html?ref=gh-pages");
        assert_eq!(seen[0].auth.as_deref(), Some("Bearer ghp_test"));
        assert_eq!(seen[1].method, Method::PUT);
        assert_eq!(seen[1].uri, "/repos/octo/site/contents/pages/x.html");
        assert_eq!(
            seen[1].body,
            json!({
                "message": "Add/update page x.html",
                "content": "aGk=",
                "branch": "gh-pages",
                "sha": "abc123"
            })
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_created_without_sha() {
        let (url, seen) = fake_api(
            answer(404, r#"{"message":"Not Found"}"#),
            answer(201, r#"{"content":{}}"#),
        )
        .await;
        let client = client_for(url, 5);

        client.put_page("new.html", "<p>n</p>").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].body.get("sha").is_none());
    }

    #[tokio::test]
    async fn test_api_message_is_surfaced() {
        let (url, _) = fake_api(
            answer(200, r#"{"sha":"old"}"#),
            answer(409, r#"{"message":"conflict"}"#),
        )
        .await;
        let client = client_for(url, 5);

        let err = client.put_page("x.html", "hi").await.unwrap_err();
        assert!(matches!(
            &err,
            RemoteError::Api { status: 409, message } if message == "conflict"
        ));
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_unreadable_error_body_gets_generic_message() {
        let (url, _) = fake_api(answer(404, "{}"), answer(500, "<html>oops</html>")).await;
        let client = client_for(url, 5);

        let err = client.put_page("x.html", "hi").await.unwrap_err();
        assert!(matches!(
            &err,
            RemoteError::Api { status: 500, message } if message == "GitHub API error"
        ));
        assert_eq!(err.to_string(), "GitHub API error");
    }

    #[tokio::test]
    async fn test_stalled_api_times_out() {
        let stalled = Answer {
            delay: Duration::from_secs(5),
            ..answer(200, "{}")
        };
        let (url, _) = fake_api(answer(404, "{}"), stalled).await;
        let client = client_for(url, 1);

        let err = client.put_page("x.html", "hi").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
