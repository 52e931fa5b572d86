//! In-memory cache backend.
//!
//! Used for ephemeral deployments and tests. Partitions keep creation order
//! so `match_any` behaves the same as the SQLite backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{CacheStore, Entry};
use crate::Error;

#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<Vec<(String, HashMap<String, Entry>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn create_partition(&self, name: &str) -> Result<bool, Error> {
        let mut partitions = self.partitions.write().await;
        if partitions.iter().any(|(n, _)| n == name) {
            return Ok(false);
        }
        partitions.push((name.to_string(), HashMap::new()));
        Ok(true)
    }

    async fn partitions(&self) -> Result<Vec<String>, Error> {
        Ok(self.partitions.read().await.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|(n, _)| n != name);
        Ok(partitions.len() != before)
    }

    async fn get_entry(&self, partition: &str, hash: &str) -> Result<Option<Entry>, Error> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .iter()
            .find(|(n, _)| n == partition)
            .and_then(|(_, entries)| entries.get(hash).cloned()))
    }

    async fn put_entry(&self, partition: &str, entry: Entry) -> Result<(), Error> {
        let mut partitions = self.partitions.write().await;
        let index = match partitions.iter().position(|(n, _)| n == partition) {
            Some(index) => index,
            None => {
                partitions.push((partition.to_string(), HashMap::new()));
                partitions.len() - 1
            }
        };
        partitions[index].1.insert(entry.key.hash.clone(), entry);
        Ok(())
    }

    async fn delete_entry(&self, partition: &str, hash: &str) -> Result<bool, Error> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .iter_mut()
            .find(|(n, _)| n == partition)
            .is_some_and(|(_, entries)| entries.remove(hash).is_some()))
    }

    async fn entries(&self, partition: &str) -> Result<Vec<Entry>, Error> {
        let partitions = self.partitions.read().await;
        let mut entries: Vec<Entry> = partitions
            .iter()
            .find(|(n, _)| n == partition)
            .map(|(_, entries)| entries.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.key.url.cmp(&b.key.url));
        Ok(entries)
    }

    async fn count(&self, partition: &str) -> Result<u64, Error> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .iter()
            .find(|(n, _)| n == partition)
            .map(|(_, entries)| entries.len() as u64)
            .unwrap_or(0))
    }

    async fn match_any(&self, hash: &str) -> Result<Option<Entry>, Error> {
        let partitions = self.partitions.read().await;
        Ok(partitions.iter().find_map(|(_, entries)| entries.get(hash).cloned()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
