//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `cache_prefix` or `version` is empty or contains whitespace
    /// - `origin` is not an absolute http(s) URL
    /// - `offline_document` is not origin-relative
    /// - a data extension does not start with `.`
    /// - a manifest entry or the offline document does not resolve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        for (field, value) in [("cache_prefix", &self.cache_prefix), ("version", &self.version)] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(invalid(field, "must not contain whitespace"));
            }
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.has_host() => {}
            Ok(origin) => return Err(invalid("origin", format!("unsupported origin: {origin}"))),
            Err(e) => return Err(invalid("origin", e.to_string())),
        }

        if !self.offline_document.starts_with('/') {
            return Err(invalid("offline_document", "must be an origin-relative path starting with '/'"));
        }

        if let Some(ext) = self.data_extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(invalid("data_extensions", format!("{ext:?} must look like \".json\"")));
        }

        if self.sync_tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(invalid("sync_tags", "tags must not be empty"));
        }

        self.cache_config()?;

        if self.manifest.is_empty() {
            tracing::warn!("manifest is empty; install will only create partitions");
        }

        Ok(())
    }
}
