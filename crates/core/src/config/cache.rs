//! Immutable cache policy shared by the worker components.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{AppConfig, ConfigError};
use crate::cache::RequestKey;
use crate::http::Request;

/// What install does when a manifest URL cannot be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum InstallPolicy {
    /// Cache what can be cached; log and skip the rest.
    #[default]
    BestEffort,
    /// Any failure fails the whole install and leaves the partition as it was.
    Atomic,
}

/// Resolved, validated cache policy.
///
/// Built once from [`AppConfig`] and shared behind an `Arc`; nothing mutates
/// it afterwards.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub origin: Url,
    pub version: String,
    pub static_partition: String,
    pub dynamic_partition: String,
    pub manifest: Vec<Url>,
    pub offline_document: Url,
    pub offline_message: String,
    pub data_extensions: Vec<String>,
    pub vary_headers: Vec<String>,
    pub install_policy: InstallPolicy,
    pub fetch_timeout: Duration,
    pub skip_waiting: bool,
    pub claim_clients: bool,
    pub cache_static_on_miss: bool,
    pub sync_tags: Vec<String>,
    pub push_title: String,
    pub push_default_body: String,
}

impl CacheConfig {
    /// True for the partitions owned by the current generation.
    pub fn is_current(&self, partition: &str) -> bool {
        partition == self.static_partition || partition == self.dynamic_partition
    }

    pub fn key_for(&self, request: &Request) -> RequestKey {
        RequestKey::for_request(request, &self.vary_headers)
    }

    /// Resolve a URL the way every entry point names resources.
    ///
    /// Absolute http(s) URLs are kept; anything else, with or without a
    /// leading `/`, is joined onto the origin. The fragment is dropped.
    pub fn resolve(&self, input: &str) -> Result<Url, ConfigError> {
        resolve_against(&self.origin, input)
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

fn resolve_against(origin: &Url, input: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { field: "url".into(), reason };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty URL".into()));
    }
    let mut url = origin.join(trimmed).map_err(|e| invalid(format!("{input}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme: {}", url.scheme())));
    }
    url.set_fragment(None);
    Ok(url)
}

impl AppConfig {
    /// Resolve this configuration into the immutable [`CacheConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin, a manifest entry or the
    /// offline document is not a valid URL.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;

        let manifest = self
            .manifest
            .iter()
            .map(|entry| resolve_against(&origin, entry))
            .collect::<Result<Vec<_>, _>>()?;
        let offline_document = resolve_against(&origin, &self.offline_document)?;

        Ok(CacheConfig {
            version: self.version.clone(),
            static_partition: self.static_partition(),
            dynamic_partition: self.dynamic_partition(),
            manifest,
            offline_document,
            offline_message: self.offline_message.clone(),
            data_extensions: self.data_extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect(),
            vary_headers: self.vary_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
            install_policy: self.install_policy,
            fetch_timeout: self.timeout(),
            skip_waiting: self.skip_waiting,
            claim_clients: self.claim_clients,
            cache_static_on_miss: self.cache_static_on_miss,
            sync_tags: self.sync_tags.clone(),
            push_title: self.push_title.clone(),
            push_default_body: self.push_default_body.clone(),
            origin,
        })
    }
}
