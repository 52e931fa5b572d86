//! Partitioned cache storage.
//!
//! A [`CacheStore`] backend holds named partitions of request-keyed entries.
//! [`Caches`] is the shared front door over a backend and hands out
//! [`Partition`] handles; neither holds any state beyond the backend `Arc`.

use std::sync::Arc;

use async_trait::async_trait;

use super::hash::RequestKey;
use crate::Error;
use crate::http::Response;

/// A stored response snapshot, keyed by request identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: RequestKey,
    pub response: Response,
    pub stored_at: String,
}

/// Storage backend for partitioned entries.
///
/// Writes of a whole entry must be atomic with respect to concurrent readers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the partition if absent. Returns true if it was created.
    async fn create_partition(&self, name: &str) -> Result<bool, Error>;

    /// Partition names in creation order.
    async fn partitions(&self) -> Result<Vec<String>, Error>;

    /// Drop a partition and all its entries. Returns false if it did not exist.
    async fn delete_partition(&self, name: &str) -> Result<bool, Error>;

    async fn get_entry(&self, partition: &str, hash: &str) -> Result<Option<Entry>, Error>;

    /// Insert or replace an entry, creating the partition if needed.
    async fn put_entry(&self, partition: &str, entry: Entry) -> Result<(), Error>;

    async fn delete_entry(&self, partition: &str, hash: &str) -> Result<bool, Error>;

    async fn entries(&self, partition: &str) -> Result<Vec<Entry>, Error>;

    async fn count(&self, partition: &str) -> Result<u64, Error>;

    /// First entry for `hash`, searching partitions in creation order.
    async fn match_any(&self, hash: &str) -> Result<Option<Entry>, Error>;

    fn name(&self) -> &'static str;
}

/// Shared handle over a [`CacheStore`].
#[derive(Clone)]
pub struct Caches {
    store: Arc<dyn CacheStore>,
}

impl Caches {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Open a partition, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<Partition, Error> {
        if self.store.create_partition(name).await? {
            tracing::debug!(partition = name, backend = self.store.name(), "created partition");
        }
        Ok(self.partition(name))
    }

    /// Handle to a partition without touching storage. Writes through the
    /// handle create the partition on demand.
    pub fn partition(&self, name: &str) -> Partition {
        Partition { store: Arc::clone(&self.store), name: name.to_string() }
    }

    pub async fn partitions(&self) -> Result<Vec<String>, Error> {
        self.store.partitions().await
    }

    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        self.store.delete_partition(name).await
    }

    pub async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>, Error> {
        Ok(self.store.match_any(&key.hash).await?.map(|entry| entry.response))
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }
}

impl std::fmt::Debug for Caches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caches").field("backend", &self.store.name()).finish()
    }
}

/// A named partition within a [`CacheStore`].
#[derive(Clone)]
pub struct Partition {
    store: Arc<dyn CacheStore>,
    name: String,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &RequestKey) -> Result<Option<Response>, Error> {
        Ok(self.store.get_entry(&self.name, &key.hash).await?.map(|entry| entry.response))
    }

    pub async fn entry(&self, key: &RequestKey) -> Result<Option<Entry>, Error> {
        self.store.get_entry(&self.name, &key.hash).await
    }

    /// Persist a snapshot of `response` under `key`.
    ///
    /// The caller keeps its own handle. Responses that cannot be replayed
    /// safely (non-2xx, opaque, error, redirected) are refused with
    /// [`Error::UnsupportedResponse`] and nothing is written.
    pub async fn put(&self, key: &RequestKey, response: &Response) -> Result<(), Error> {
        if !response.is_cacheable() {
            return Err(Error::UnsupportedResponse(format!(
                "{} (status {}, kind {}, redirected {})",
                key.url, response.status, response.kind, response.redirected
            )));
        }
        if key.method != "GET" {
            return Err(Error::UnsupportedResponse(format!("{} {} is not cacheable", key.method, key.url)));
        }

        let entry = Entry { key: key.clone(), response: response.clone(), stored_at: chrono::Utc::now().to_rfc3339() };
        self.store.put_entry(&self.name, entry).await
    }

    pub async fn delete(&self, key: &RequestKey) -> Result<bool, Error> {
        self.store.delete_entry(&self.name, &key.hash).await
    }

    pub async fn entries(&self) -> Result<Vec<Entry>, Error> {
        self.store.entries(&self.name).await
    }

    /// Keys of every entry, ordered by URL.
    pub async fn keys(&self) -> Result<Vec<RequestKey>, Error> {
        Ok(self.entries().await?.into_iter().map(|entry| entry.key).collect())
    }

    pub async fn len(&self) -> Result<u64, Error> {
        self.store.count(&self.name).await
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition").field("name", &self.name).field("backend", &self.store.name()).finish()
    }
}
