//! Generation population and cleanup.
//!
//! A generation is the pair of partitions named after the current version
//! label. Install fills the static partition from the manifest; activation
//! deletes every partition that does not belong to the current generation.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use url::Url;

use crate::Error;
use crate::cache::{Caches, Partition, RequestKey};
use crate::config::{CacheConfig, InstallPolicy};
use crate::http::{Fetcher, Request, RequestMode, Response, fetch_with_timeout};

/// A manifest URL that could not be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct ManifestFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub version: String,
    /// Partition the manifest was written to.
    pub partition: String,
    pub cached: Vec<String>,
    pub failed: Vec<ManifestFailure>,
}

#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct ActivateReport {
    pub version: String,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    /// Clients taken over after the purge; filled in by the lifecycle controller.
    pub claimed: usize,
}

type Fetched = Result<(RequestKey, Response), String>;

pub struct GenerationManager {
    caches: Caches,
    fetcher: Arc<dyn Fetcher>,
    config: Arc<CacheConfig>,
}

impl GenerationManager {
    pub fn new(caches: Caches, fetcher: Arc<dyn Fetcher>, config: Arc<CacheConfig>) -> Self {
        Self { caches, fetcher, config }
    }

    /// Create the current partitions and populate the static one from `manifest`.
    ///
    /// # Errors
    ///
    /// Fails when a partition cannot be created, or under
    /// [`InstallPolicy::Atomic`] when any manifest URL cannot be fetched or
    /// stored. Fetch failures abort before any write; a storage failure rolls
    /// back the entries already written in this install.
    pub async fn on_install(&self, manifest: &[Url]) -> Result<InstallReport, Error> {
        let statics = self.caches.open(&self.config.static_partition).await?;
        self.caches.open(&self.config.dynamic_partition).await?;

        let fetched = self.fetch_all(manifest).await;

        let mut report = InstallReport {
            version: self.config.version.clone(),
            partition: statics.name().to_string(),
            cached: Vec::new(),
            failed: Vec::new(),
        };

        if self.config.install_policy == InstallPolicy::Atomic {
            if let Some((url, Err(reason))) = manifest.iter().zip(&fetched).find(|(_, result)| result.is_err()) {
                tracing::warn!(url = %url, %reason, "atomic install aborted");
                return Err(Error::ManifestEntry { url: url.to_string(), reason: reason.clone() });
            }
        }

        let mut written = Vec::new();
        for (url, result) in manifest.iter().zip(fetched) {
            let outcome = match result {
                Ok((key, response)) => match replace(&statics, &key, &response).await {
                    Ok(previous) => {
                        written.push((key, previous));
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                },
                Err(reason) => Err(reason),
            };
            match outcome {
                Ok(()) => report.cached.push(url.to_string()),
                Err(reason) => {
                    if self.config.install_policy == InstallPolicy::Atomic {
                        tracing::warn!(url = %url, %reason, rolled_back = written.len(), "atomic install aborted");
                        roll_back(&statics, written).await;
                        return Err(Error::ManifestEntry { url: url.to_string(), reason });
                    }
                    tracing::warn!(url = %url, %reason, "manifest entry skipped");
                    report.failed.push(ManifestFailure { url: url.to_string(), reason });
                }
            }
        }

        tracing::info!(
            version = %report.version,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install populated generation"
        );
        Ok(report)
    }

    /// Fetch every manifest URL concurrently. Results keep manifest order.
    async fn fetch_all(&self, manifest: &[Url]) -> Vec<Fetched> {
        let mut results: Vec<Fetched> = manifest.iter().map(|_| Err("task aborted".to_string())).collect();
        let mut tasks = JoinSet::new();

        for (index, url) in manifest.iter().enumerate() {
            let mode = if self.config.is_same_origin(url) { RequestMode::SameOrigin } else { RequestMode::Cors };
            let request = Request::get(url.clone()).with_mode(mode);
            let key = self.config.key_for(&request);
            let fetcher = Arc::clone(&self.fetcher);
            let timeout = self.config.fetch_timeout;

            tasks.spawn(async move {
                let result = match fetch_with_timeout(fetcher.as_ref(), &request, timeout).await {
                    Ok(response) if response.is_cacheable() => Ok((key, response)),
                    Ok(response) => Err(format!(
                        "status {} ({}, redirected {})",
                        response.status, response.kind, response.redirected
                    )),
                    Err(e) => Err(e.to_string()),
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(e) => tracing::warn!(error = %e, "manifest fetch task failed"),
            }
        }
        results
    }

    /// Delete every partition that is not part of the current generation.
    ///
    /// A partition that fails to delete is logged and left for the next
    /// activation.
    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        let mut report =
            ActivateReport { version: self.config.version.clone(), kept: Vec::new(), deleted: Vec::new(), claimed: 0 };

        for name in self.caches.partitions().await? {
            if self.config.is_current(&name) {
                report.kept.push(name);
                continue;
            }
            match self.caches.delete_partition(&name).await {
                Ok(_) => {
                    tracing::info!(partition = %name, "deleted stale partition");
                    report.deleted.push(name);
                }
                Err(e) => tracing::warn!(partition = %name, error = %e, "failed to delete stale partition"),
            }
        }

        Ok(report)
    }
}

/// Store `response` under `key`, returning what it replaced.
async fn replace(statics: &Partition, key: &RequestKey, response: &Response) -> Result<Option<Response>, Error> {
    let previous = statics.get(key).await?;
    statics.put(key, response).await?;
    Ok(previous)
}

/// Undo manifest writes, newest first, restoring replaced entries.
async fn roll_back(statics: &Partition, written: Vec<(RequestKey, Option<Response>)>) {
    for (key, previous) in written.into_iter().rev() {
        let restored = match previous {
            Some(response) => statics.put(&key, &response).await,
            None => statics.delete(&key).await.map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::warn!(url = %key.url, error = %e, "failed to roll back manifest entry");
        }
    }
}
