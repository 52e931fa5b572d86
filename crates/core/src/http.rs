//! Request and response values exchanged with the network.
//!
//! These are plain data types with no tie to any HTTP client. The [`Fetcher`]
//! trait is the seam where a real client (reqwest in `offgrid-client`) or a
//! test double plugs in.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Json,
    #[default]
    Empty,
}

/// Cross-origin handling requested for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    #[default]
    NoCors,
}

/// How a response may be observed and replayed.
///
/// Only `Basic`, `Cors` and `Synthetic` bodies are readable; `Opaque` and
/// `Error` are handed back to the caller but never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Basic,
    Cors,
    Opaque,
    Error,
    Synthetic,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Basic => "basic",
            ResponseKind::Cors => "cors",
            ResponseKind::Opaque => "opaque",
            ResponseKind::Error => "error",
            ResponseKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ResponseKind::Basic),
            "cors" => Ok(ResponseKind::Cors),
            "opaque" => Ok(ResponseKind::Opaque),
            "error" => Ok(ResponseKind::Error),
            "synthetic" => Ok(ResponseKind::Synthetic),
            other => Err(Error::Storage(format!("unknown response kind: {other}"))),
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    /// Connected client that issued the request, if known.
    pub client_id: Option<u64>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
            destination: Destination::default(),
            mode: RequestMode::default(),
            headers: BTreeMap::new(),
            client_id: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_client(mut self, client_id: u64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A response as produced by the network or replayed from the cache.
///
/// The body is an immutable [`Bytes`] buffer, so cloning a response yields an
/// independent handle: one copy can be persisted while the other is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub redirected: bool,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, kind: ResponseKind, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            kind,
            redirected: false,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Build a locally-synthesized JSON response.
    pub fn synthetic_json(url: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::new(url, 200, ResponseKind::Synthetic, value.to_string()).with_header("content-type", "application/json")
    }

    /// Response handed out when a data resource is neither cached nor reachable.
    pub fn offline_json(url: impl Into<String>, message: &str) -> Self {
        Self::synthetic_json(url, &serde_json::json!({ "error": message, "offline": true }))
            .with_header("x-offgrid-offline", "1")
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this response may be written to a partition.
    pub fn is_cacheable(&self) -> bool {
        self.is_ok()
            && !self.redirected
            && matches!(self.kind, ResponseKind::Basic | ResponseKind::Cors | ResponseKind::Synthetic)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Network access as seen by the proxy.
///
/// Implementations return `Ok` for every response the network produced,
/// including 4xx/5xx statuses, and `Err` only when no response exists.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Fetch with an upper bound on latency. Elapsing is reported as
/// [`Error::Timeout`], which callers treat as a network failure.
pub async fn fetch_with_timeout(fetcher: &dyn Fetcher, request: &Request, timeout: Duration) -> Result<Response, Error> {
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} after {}ms", request.url, timeout.as_millis()))),
    }
}
