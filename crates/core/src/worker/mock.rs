//! Scripted [`Fetcher`] and a faulty [`CacheStore`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::Error;
use crate::cache::{CacheStore, Entry, MemoryStore};
use crate::http::{Fetcher, Request, Response, ResponseKind};

#[derive(Clone)]
enum Reply {
    Respond { status: u16, body: String, kind: ResponseKind, delay: Option<Duration> },
    Fail,
}

/// Replies are registered per full URL or per path; full URLs win.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, route: &str, status: u16, body: &str) {
        self.set(route, Reply::Respond { status, body: body.into(), kind: ResponseKind::Basic, delay: None });
    }

    pub fn respond_kind(&self, route: &str, status: u16, body: &str, kind: ResponseKind) {
        self.set(route, Reply::Respond { status, body: body.into(), kind, delay: None });
    }

    pub fn respond_after(&self, route: &str, status: u16, body: &str, delay: Duration) {
        self.set(route, Reply::Respond { status, body: body.into(), kind: ResponseKind::Basic, delay: Some(delay) });
    }

    pub fn fail(&self, route: &str) {
        self.set(route, Reply::Fail);
    }

    pub fn calls(&self, route: &str) -> usize {
        self.calls.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    fn set(&self, route: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(route.to_string(), reply);
    }

    fn route(&self, request: &Request) -> (String, Option<Reply>) {
        let replies = self.replies.lock().unwrap();
        let full = request.url.as_str().to_string();
        if let Some(reply) = replies.get(&full) {
            return (full, Some(reply.clone()));
        }
        let path = request.url.path().to_string();
        let reply = replies.get(&path).cloned();
        (path, reply)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let (route, reply) = self.route(request);
        *self.calls.lock().unwrap().entry(route).or_default() += 1;

        match reply {
            Some(Reply::Respond { status, body, kind, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let content_type = if request.url.path().ends_with(".json") { "application/json" } else { "text/html" };
                Ok(Response::new(request.url.as_str(), status, kind, body).with_header("content-type", content_type))
            }
            Some(Reply::Fail) => Err(Error::Network(format!("connection refused: {}", request.url))),
            None => Err(Error::Network(format!("no route for {}", request.url))),
        }
    }
}

/// A [`MemoryStore`] whose reads or writes can be made to fail.
///
/// Write failures are keyed by URL suffix; an empty suffix fails every write.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes_to(&self, suffix: &str) {
        self.fail_writes.lock().unwrap().push(suffix.to_string());
    }

    fn check_read(&self) -> Result<(), Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn create_partition(&self, name: &str) -> Result<bool, Error> {
        self.inner.create_partition(name).await
    }

    async fn partitions(&self) -> Result<Vec<String>, Error> {
        self.inner.partitions().await
    }

    async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete_partition(name).await
    }

    async fn get_entry(&self, partition: &str, hash: &str) -> Result<Option<Entry>, Error> {
        self.check_read()?;
        self.inner.get_entry(partition, hash).await
    }

    async fn put_entry(&self, partition: &str, entry: Entry) -> Result<(), Error> {
        let refused = self.fail_writes.lock().unwrap().iter().any(|suffix| entry.key.url.ends_with(suffix.as_str()));
        if refused {
            return Err(Error::Storage("quota exceeded".into()));
        }
        self.inner.put_entry(partition, entry).await
    }

    async fn delete_entry(&self, partition: &str, hash: &str) -> Result<bool, Error> {
        self.inner.delete_entry(partition, hash).await
    }

    async fn entries(&self, partition: &str) -> Result<Vec<Entry>, Error> {
        self.inner.entries(partition).await
    }

    async fn count(&self, partition: &str) -> Result<u64, Error> {
        self.inner.count(partition).await
    }

    async fn match_any(&self, hash: &str) -> Result<Option<Entry>, Error> {
        self.check_read()?;
        self.inner.match_any(hash).await
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}
