//! HTTP fetch client behind the core `Fetcher` trait.
//!
//! ### Response kinds
//! - Same-origin and navigation requests produce `basic` responses.
//! - Cross-origin `cors` requests produce `cors` responses.
//! - Cross-origin `no-cors` requests produce `opaque` responses: status is
//!   kept, headers and body are withheld.
//! - Cross-origin requests in `same-origin` mode fail without touching the
//!   network.
//!
//! ### Limits
//! - Max redirects: 5 (a redirected response is flagged and never cached)
//! - Max body bytes: 5MB (configurable)
//! - Per-request timeout; elapsing maps to `FETCH_TIMEOUT`

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Url, header};

use offgrid_core::http::{Fetcher, Request, RequestMode, Response, ResponseKind};
use offgrid_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offgrid/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Origin of the proxied application; decides basic vs cross-origin kinds.
    pub origin: Url,
}

impl FetchConfig {
    pub fn from_app(config: &AppConfig, origin: Url) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
            origin,
        }
    }
}

/// HTTP client that answers the proxy's network requests.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn response_kind(&self, request: &Request) -> Result<ResponseKind, Error> {
        if request.url.origin() == self.config.origin.origin() || request.mode == RequestMode::Navigate {
            return Ok(ResponseKind::Basic);
        }
        match request.mode {
            RequestMode::NoCors => Ok(ResponseKind::Opaque),
            RequestMode::Cors => Ok(ResponseKind::Cors),
            RequestMode::SameOrigin => {
                Err(Error::Network(format!("cross-origin request to {} in same-origin mode", request.url)))
            }
            RequestMode::Navigate => Ok(ResponseKind::Basic),
        }
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }
        Ok(())
    }
}

fn map_send_error(url: &Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

#[async_trait]
impl Fetcher for FetchClient {
    /// Send `request` and read the whole body.
    ///
    /// Any status is returned as `Ok`; only transport failures, timeouts and
    /// oversized bodies are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let kind = self.response_kind(request)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("unsupported method: {}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| map_send_error(&request.url, &e))?;

        let status = response.status().as_u16();
        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let final_url = response.url().clone();
        let mut requested = request.url.clone();
        requested.set_fragment(None);
        let redirected = final_url != requested;
        let headers = collect_headers(response.headers());

        let body = response.bytes().await.map_err(|e| map_send_error(&request.url, &e))?;
        self.check_size(body.len())?;

        tracing::debug!(
            url = %request.url,
            final_url = %final_url,
            status,
            kind = %kind,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        let mut response = Response::new(final_url.as_str(), status, kind, body);
        response.redirected = redirected;
        if kind == ResponseKind::Opaque {
            response.body = Bytes::new();
        } else {
            response.headers = headers;
        }
        Ok(response)
    }
}
