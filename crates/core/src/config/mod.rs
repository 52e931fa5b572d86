//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFGRID_*)
//! 2. TOML config file (if OFFGRID_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded [`AppConfig`] is turned into an immutable [`CacheConfig`] that
//! the worker components share.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod cache;
mod validation;

pub use cache::{CacheConfig, InstallPolicy};
pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFGRID_*)
/// 2. TOML config file (if OFFGRID_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via OFFGRID_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Keep partitions in memory instead of SQLite.
    ///
    /// Set via OFFGRID_IN_MEMORY environment variable.
    #[serde(default)]
    pub in_memory: bool,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFGRID_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via OFFGRID_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network fetch timeout in milliseconds. Elapsing counts as a network failure.
    ///
    /// Set via OFFGRID_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Origin of the application being proxied; relative URLs resolve against it.
    ///
    /// Set via OFFGRID_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix for partition names.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Current generation label. Changing it makes the next activation
    /// delete every partition of the previous generation.
    ///
    /// Set via OFFGRID_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// URLs pre-populated at install, absolute or origin-relative.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Document served to navigations when both the network and the exact
    /// cached page are unavailable.
    #[serde(default = "default_offline_document")]
    pub offline_document: String,

    /// Message placed in the synthetic offline body of data resources.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,

    /// Path suffixes classified as data resources.
    #[serde(default = "default_data_extensions")]
    pub data_extensions: Vec<String>,

    /// Request headers whose values are part of the cache key.
    #[serde(default)]
    pub vary_headers: Vec<String>,

    /// How install reacts to a manifest URL that cannot be cached.
    #[serde(default)]
    pub install_policy: InstallPolicy,

    /// Activate right after a successful install instead of waiting.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Take control of already-connected clients on activation.
    #[serde(default = "default_true")]
    pub claim_clients: bool,

    /// Store successful same-origin static assets fetched on a cache miss.
    #[serde(default = "default_true")]
    pub cache_static_on_miss: bool,

    /// Periodic-sync tags that trigger the data-changed broadcast.
    #[serde(default = "default_sync_tags")]
    pub sync_tags: Vec<String>,

    /// Title of notices produced from push signals.
    #[serde(default = "default_push_title")]
    pub push_title: String,

    /// Body used when a push signal carries no payload.
    #[serde(default = "default_push_body")]
    pub push_default_body: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offgrid-cache.sqlite")
}

fn default_user_agent() -> String {
    "offgrid/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_prefix() -> String {
    "offgrid".into()
}

fn default_version() -> String {
    "v1.0".into()
}

fn default_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into()]
}

fn default_offline_document() -> String {
    "/".into()
}

fn default_offline_message() -> String {
    "Offline mode".into()
}

fn default_data_extensions() -> Vec<String> {
    vec![".json".into()]
}

fn default_sync_tags() -> Vec<String> {
    vec!["background-sync".into()]
}

fn default_push_title() -> String {
    "offgrid".into()
}

fn default_push_body() -> String {
    "New data available".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            in_memory: false,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            manifest: default_manifest(),
            offline_document: default_offline_document(),
            offline_message: default_offline_message(),
            data_extensions: default_data_extensions(),
            vary_headers: Vec::new(),
            install_policy: InstallPolicy::default(),
            skip_waiting: true,
            claim_clients: true,
            cache_static_on_miss: true,
            sync_tags: default_sync_tags(),
            push_title: default_push_title(),
            push_default_body: default_push_body(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFGRID_`
    /// 2. TOML file from `OFFGRID_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFGRID_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFGRID_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Partition holding the manifest, documents and static assets.
    pub fn static_partition(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.version)
    }

    /// Partition holding data resources and primed entries.
    pub fn dynamic_partition(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.version)
    }
}
