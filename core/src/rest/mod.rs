//! REST client pool for the Kubernetes API server
//!
//! Thin layer over `reqwest`: one [`RestClient`] per long-lived connection,
//! a fluent [`RestRequest`] for URL composition and retry handling, and a
//! line-delimited [`WatchStream`] for watch requests. Retrying on 429 with
//! Retry-After lives here; everything above just sets `max_retries`.

mod kubeconfig;
mod options;

pub use kubeconfig::{load as load_kubeconfig, resolve as resolve_kubeconfig, ClusterAccess};
pub use options::{GetOptions, ListOptions, PodLogOptions, QueryParams};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Method;
use url::Url;

use crate::error::{Error, RequestError, Result};
use crate::profile::{ContentType, PatchType};

/// Options shared by every client in a pool.
#[derive(Debug, Clone, Default)]
pub struct ClientPoolOptions {
    /// User-Agent header; `None` keeps the library default.
    pub user_agent: Option<String>,
    /// Response content type to request.
    pub content_type: ContentType,
    /// Use HTTP/1.1 instead of HTTP/2.
    pub disable_http2: bool,
}

/// Build `conns` independent clients against the same cluster. Each client
/// owns its own connection pool, so the pool size maps to the number of
/// long-lived connections.
pub fn build_clients(
    access: &ClusterAccess,
    conns: usize,
    opts: &ClientPoolOptions,
) -> Result<Vec<RestClient>> {
    (0..conns.max(1))
        .map(|_| RestClient::from_access(access, opts))
        .collect()
}

/// A client bound to one API server base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
}

impl RestClient {
    /// Create a client with default HTTP settings; used against plain HTTP
    /// endpoints and in tests.
    pub fn new(base: Url) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(Error::Client(format!("invalid base URL: {base}")));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// Create a client from resolved kubeconfig access parameters.
    pub fn from_access(access: &ClusterAccess, opts: &ClientPoolOptions) -> Result<Self> {
        let base = Url::parse(&access.server)
            .map_err(|err| Error::Client(format!("invalid server URL {:?}: {err}", access.server)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Client(format!("invalid server URL: {base}")));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(opts.content_type.accept_header()),
        );
        if let Some(token) = &access.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| Error::Client(format!("invalid bearer token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(1);
        if let Some(user_agent) = &opts.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if opts.disable_http2 {
            builder = builder.http1_only();
        }
        if access.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|err| Error::Client(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, base })
    }

    fn request(&self, method: Method) -> RestRequest {
        RestRequest {
            http: self.http.clone(),
            base: self.base.clone(),
            method,
            content_type: None,
            segments: Vec::new(),
            params: Vec::new(),
            body: None,
            max_retries: 0,
            timeout: None,
        }
    }

    /// Start a GET request.
    pub fn get(&self) -> RestRequest {
        self.request(Method::GET)
    }

    /// Start a POST request.
    pub fn post(&self) -> RestRequest {
        self.request(Method::POST).content_type("application/json")
    }

    /// Start a PUT request.
    pub fn put(&self) -> RestRequest {
        self.request(Method::PUT).content_type("application/json")
    }

    /// Start a DELETE request.
    pub fn delete(&self) -> RestRequest {
        self.request(Method::DELETE)
    }

    /// Start a PATCH request with the given patch encoding.
    pub fn patch(&self, patch_type: PatchType) -> RestRequest {
        self.request(Method::PATCH)
            .content_type(patch_type.content_type())
    }
}

/// A composable request against the API server.
#[derive(Debug, Clone)]
pub struct RestRequest {
    http: reqwest::Client,
    base: Url,
    method: Method,
    content_type: Option<&'static str>,
    segments: Vec<String>,
    params: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    max_retries: usize,
    timeout: Option<Duration>,
}

impl RestRequest {
    /// Replace the URL path with the given absolute segments.
    pub fn abs_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments = segments.into_iter().map(Into::into).collect();
        self
    }

    /// Attach an option set as query parameters.
    pub fn versioned_params(mut self, opts: &dyn QueryParams) -> Self {
        opts.append_to(&mut self.params);
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the retry ceiling for 429 responses carrying Retry-After.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn content_type(mut self, value: &'static str) -> Self {
        self.content_type = Some(value);
        self
    }

    /// Set the per-attempt timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// The HTTP method of this request.
    pub fn http_method(&self) -> &Method {
        &self.method
    }

    /// The fully-composed URL.
    pub fn url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear();
            path.extend(self.segments.iter().map(String::as_str));
        }
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Send the request and return the response once a success status
    /// arrives, retrying 429s up to `max_retries` times.
    pub async fn stream(&self) -> std::result::Result<reqwest::Response, RequestError> {
        let mut attempt = 0usize;
        loop {
            let mut request = self.http.request(self.method.clone(), self.url());
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }
            if let Some(content_type) = self.content_type {
                request = request.header(CONTENT_TYPE, content_type);
            }
            if let Some(body) = &self.body {
                request = request.body(body.clone());
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 && attempt < self.max_retries {
                attempt += 1;
                let delay = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                tracing::debug!(attempt, delay_secs = delay, url = %self.url(), "retrying after 429");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                continue;
            }

            return Err(RequestError::Status {
                status: status.as_u16(),
            });
        }
    }

    /// Send the request and hand back the body as a line-delimited watch
    /// event stream.
    pub async fn watch(&self) -> std::result::Result<WatchStream, RequestError> {
        let response = self.stream().await?;
        Ok(WatchStream {
            response,
            buffer: Vec::new(),
            done: false,
        })
    }
}

/// A single event from a watch stream.
#[derive(Debug, serde::Deserialize)]
pub struct WatchEvent {
    /// Event type: ADDED, MODIFIED, DELETED, BOOKMARK or ERROR.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// The event payload.
    #[serde(default)]
    pub object: serde_json::Value,
}

impl WatchEvent {
    /// Whether this is the bookmark marking the end of the initial
    /// watch-list state.
    pub fn is_initial_events_end(&self) -> bool {
        self.event_type == "BOOKMARK"
            && self.object["metadata"]["annotations"]["k8s.io/initial-events-end"] == "true"
    }
}

/// Line-delimited JSON event stream from a watch request.
pub struct WatchStream {
    response: reqwest::Response,
    buffer: Vec<u8>,
    done: bool,
}

impl WatchStream {
    /// Read the next event; `None` once the stream has ended.
    pub async fn next_event(
        &mut self,
    ) -> Option<std::result::Result<WatchEvent, RequestError>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some(
                    serde_json::from_slice(line)
                        .map_err(|err| RequestError::WatchDecode(err.to_string())),
                );
            }

            if self.done {
                if self.buffer.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut self.buffer);
                if line.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                return Some(
                    serde_json::from_slice(&line)
                        .map_err(|err| RequestError::WatchDecode(err.to_string())),
                );
            }

            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => self.done = true,
                Err(err) => return Some(Err(RequestError::Http(err))),
            }
        }
    }
}
