//! Retrieval strategies.
//!
//! One strategy per [`ResourceClass`]:
//!
//! - data resources: stale-while-revalidate against the dynamic partition
//! - navigations: network first, then the exact cached page, then the offline document
//! - static assets: cache first across every partition, network on miss
//!
//! Storage failures never fail a request. A failed lookup is a miss and a
//! failed write is skipped; both are logged.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::classify::{ResourceClass, classify};
use crate::Error;
use crate::cache::{Caches, Partition, RequestKey};
use crate::config::CacheConfig;
use crate::http::{Fetcher, Request, Response, ResponseKind, fetch_with_timeout};

/// Where a response handed back by the engine came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Network,
    Cache,
    /// The offline document stood in for an uncached navigation.
    OfflineFallback,
    /// A synthetic body produced locally.
    Synthetic,
}

/// A response together with its class and provenance.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub class: Option<ResourceClass>,
    pub source: Source,
}

impl Served {
    fn new(response: Response, class: Option<ResourceClass>, source: Source) -> Self {
        Self { response, class, source }
    }
}

/// Answers intercepted requests from the cache and the network.
pub struct StrategyEngine {
    caches: Caches,
    fetcher: Arc<dyn Fetcher>,
    config: Arc<CacheConfig>,
    refreshes: Mutex<JoinSet<()>>,
}

impl StrategyEngine {
    pub fn new(caches: Caches, fetcher: Arc<dyn Fetcher>, config: Arc<CacheConfig>) -> Self {
        Self { caches, fetcher, config, refreshes: Mutex::new(JoinSet::new()) }
    }

    /// Produce a response for `request`.
    ///
    /// # Errors
    ///
    /// Only navigations and static assets can fail, and only when the network
    /// failed and no cached copy exists. Data resources always get a response.
    pub async fn handle(&self, request: &Request) -> Result<Served, Error> {
        match classify(request, &self.config.data_extensions) {
            None => self.pass_through(request).await,
            Some(ResourceClass::DataResource) => Ok(self.stale_while_revalidate(request).await),
            Some(ResourceClass::Navigation) => self.network_first(request).await,
            Some(ResourceClass::StaticAsset) => self.cache_first(request).await,
        }
    }

    /// Forward to the network without touching the cache.
    pub async fn pass_through(&self, request: &Request) -> Result<Served, Error> {
        let response = self.fetcher.fetch(request).await?;
        Ok(Served::new(response, None, Source::Network))
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Served {
        let class = Some(ResourceClass::DataResource);
        let key = self.config.key_for(request);
        let dynamic = self.caches.partition(&self.config.dynamic_partition);

        if let Some(cached) = self.lookup(&dynamic, &key).await {
            self.spawn_refresh(request.clone(), key, dynamic).await;
            return Served::new(cached, class, Source::Cache);
        }

        match fetch_with_timeout(self.fetcher.as_ref(), request, self.config.fetch_timeout).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(&dynamic, &key, &response).await;
                }
                Served::new(response, class, Source::Network)
            }
            Err(e) => {
                tracing::info!(url = %request.url, error = %e, "data resource unavailable, serving offline body");
                let body = Response::offline_json(request.url.as_str(), &self.config.offline_message);
                Served::new(body, class, Source::Synthetic)
            }
        }
    }

    /// Refresh a data resource without holding up the caller. A failed
    /// refresh leaves the stale entry in place.
    async fn spawn_refresh(&self, request: Request, key: RequestKey, dynamic: Partition) {
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.config.fetch_timeout;

        let mut refreshes = self.refreshes.lock().await;
        while let Some(done) = refreshes.try_join_next() {
            if let Err(e) = done {
                tracing::warn!(error = %e, "background refresh task failed");
            }
        }

        refreshes.spawn(async move {
            match fetch_with_timeout(fetcher.as_ref(), &request, timeout).await {
                Ok(response) if response.is_ok() => match dynamic.put(&key, &response).await {
                    Ok(()) => tracing::debug!(url = %key.url, "refreshed data resource"),
                    Err(e) => tracing::warn!(url = %key.url, error = %e, "failed to store refreshed data resource"),
                },
                Ok(response) => {
                    tracing::debug!(url = %key.url, status = response.status, "refresh returned non-success, keeping cached copy")
                }
                Err(e) => tracing::debug!(url = %key.url, error = %e, "refresh failed, keeping cached copy"),
            }
        });
    }

    async fn network_first(&self, request: &Request) -> Result<Served, Error> {
        let class = Some(ResourceClass::Navigation);
        let key = self.config.key_for(request);

        let err = match fetch_with_timeout(self.fetcher.as_ref(), request, self.config.fetch_timeout).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let statics = self.caches.partition(&self.config.static_partition);
                    self.store(&statics, &key, &response).await;
                }
                return Ok(Served::new(response, class, Source::Network));
            }
            Err(e) => e,
        };

        if let Some(cached) = self.match_any(&key).await {
            tracing::info!(url = %request.url, error = %err, "network failed, serving cached page");
            return Ok(Served::new(cached, class, Source::Cache));
        }

        let offline_key = self.config.key_for(&Request::get(self.config.offline_document.clone()));
        if offline_key != key {
            if let Some(fallback) = self.match_any(&offline_key).await {
                tracing::info!(url = %request.url, error = %err, "network failed, serving offline document");
                return Ok(Served::new(fallback, class, Source::OfflineFallback));
            }
        }

        Err(err)
    }

    async fn cache_first(&self, request: &Request) -> Result<Served, Error> {
        let class = Some(ResourceClass::StaticAsset);
        let key = self.config.key_for(request);

        if let Some(cached) = self.match_any(&key).await {
            return Ok(Served::new(cached, class, Source::Cache));
        }

        let response = fetch_with_timeout(self.fetcher.as_ref(), request, self.config.fetch_timeout).await?;
        if self.config.cache_static_on_miss && response.kind == ResponseKind::Basic && response.is_cacheable() {
            let statics = self.caches.partition(&self.config.static_partition);
            self.store(&statics, &key, &response).await;
        }
        Ok(Served::new(response, class, Source::Network))
    }

    /// Wait for every in-flight background refresh.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.refreshes.lock().await);
        while let Some(done) = pending.join_next().await {
            if let Err(e) = done {
                tracing::warn!(error = %e, "background refresh task failed");
            }
        }
    }

    async fn lookup(&self, partition: &Partition, key: &RequestKey) -> Option<Response> {
        match partition.get(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(partition = partition.name(), url = %key.url, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn match_any(&self, key: &RequestKey) -> Option<Response> {
        match self.caches.match_any(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = %key.url, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, partition: &Partition, key: &RequestKey, response: &Response) {
        match partition.put(key, response).await {
            Ok(()) => {}
            Err(e) if e.is_storage() => {
                tracing::warn!(partition = partition.name(), url = %key.url, error = %e, "cache write skipped")
            }
            Err(e) => tracing::debug!(partition = partition.name(), url = %key.url, error = %e, "response not cached"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::AppConfig;
    use crate::worker::mock::{FaultyStore, MockFetcher};

    const ORIGIN: &str = "https://quiz.test";

    fn config() -> Arc<CacheConfig> {
        let app = AppConfig { origin: ORIGIN.into(), timeout_ms: 200, ..Default::default() };
        Arc::new(app.cache_config().unwrap())
    }

    fn engine(fetcher: &Arc<MockFetcher>) -> (StrategyEngine, Caches) {
        let caches = Caches::new(Arc::new(MemoryStore::new()));
        let engine = StrategyEngine::new(caches.clone(), fetcher.clone(), config());
        (engine, caches)
    }

    fn faulty_engine(fetcher: &Arc<MockFetcher>) -> (StrategyEngine, Caches, Arc<FaultyStore>) {
        let store = Arc::new(FaultyStore::new());
        let caches = Caches::new(store.clone());
        let engine = StrategyEngine::new(caches.clone(), fetcher.clone(), config());
        (engine, caches, store)
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
    }

    async fn seed(caches: &Caches, partition: &str, path: &str, body: &str) {
        let request = get(path);
        let key = config().key_for(&request);
        let response = Response::new(request.url.as_str(), 200, ResponseKind::Basic, body.to_string());
        caches.open(partition).await.unwrap().put(&key, &response).await.unwrap();
    }

    #[tokio::test]
    async fn test_data_hit_serves_stale_then_refreshes() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/farm.json", 200, r#"{"v":2}"#);
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-dynamic-v1.0", "/farm.json", r#"{"v":1}"#).await;

        let served = engine.handle(&get("/farm.json")).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.response.text(), r#"{"v":1}"#);

        engine.settle().await;
        assert_eq!(fetcher.calls("/farm.json"), 1);

        let again = engine.handle(&get("/farm.json")).await.unwrap();
        assert_eq!(again.response.text(), r#"{"v":2}"#);
        engine.settle().await;
    }

    #[tokio::test]
    async fn test_data_hit_does_not_wait_for_slow_network() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_after("/farm.json", 200, "{}", Duration::from_millis(150));
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-dynamic-v1.0", "/farm.json", r#"{"cached":true}"#).await;

        let served = tokio::time::timeout(Duration::from_millis(50), engine.handle(&get("/farm.json")))
            .await
            .expect("cached data must not wait on the network")
            .unwrap();
        assert_eq!(served.response.text(), r#"{"cached":true}"#);
        engine.settle().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_entry() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("/farm.json");
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-dynamic-v1.0", "/farm.json", r#"{"v":1}"#).await;

        engine.handle(&get("/farm.json")).await.unwrap();
        engine.settle().await;

        let served = engine.handle(&get("/farm.json")).await.unwrap();
        assert_eq!(served.response.text(), r#"{"v":1}"#);
        engine.settle().await;
    }

    #[tokio::test]
    async fn test_data_miss_offline_returns_synthetic_body() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("/patfiz.json");
        let (engine, caches) = engine(&fetcher);

        let served = engine.handle(&get("/patfiz.json")).await.unwrap();
        assert_eq!(served.source, Source::Synthetic);
        assert_eq!(served.response.status, 200);
        assert_eq!(served.response.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
        assert_eq!(body["error"], "Offline mode");

        let dynamic = caches.partition("offgrid-dynamic-v1.0");
        assert_eq!(dynamic.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_miss_stores_success_only() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/ok.json", 200, "[]");
        fetcher.respond("/gone.json", 404, "");
        let (engine, caches) = engine(&fetcher);

        assert_eq!(engine.handle(&get("/ok.json")).await.unwrap().source, Source::Network);
        let gone = engine.handle(&get("/gone.json")).await.unwrap();
        assert_eq!(gone.response.status, 404);

        let dynamic = caches.partition("offgrid-dynamic-v1.0");
        assert_eq!(dynamic.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_data_miss_timeout_is_offline() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_after("/slow.json", 200, "{}", Duration::from_secs(5));
        let (engine, _) = engine(&fetcher);

        let served = engine.handle(&get("/slow.json")).await.unwrap();
        assert_eq!(served.source, Source::Synthetic);
    }

    #[tokio::test]
    async fn test_navigation_prefers_network_and_updates_cache() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/", 200, "<html>fresh</html>");
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-static-v1.0", "/", "<html>stale</html>").await;

        let served = engine.handle(&get("/")).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.text(), "<html>fresh</html>");

        let key = config().key_for(&get("/"));
        let cached = caches.partition("offgrid-static-v1.0").get(&key).await.unwrap().unwrap();
        assert_eq!(cached.text(), "<html>fresh</html>");
    }

    #[tokio::test]
    async fn test_navigation_error_status_not_cached() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/missing.html", 404, "not found");
        let (engine, caches) = engine(&fetcher);

        let served = engine.handle(&get("/missing.html")).await.unwrap();
        assert_eq!(served.response.status, 404);
        assert_eq!(caches.partition("offgrid-static-v1.0").len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_navigation_offline_uses_exact_then_offline_document() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("/about.html");
        fetcher.fail("/quiz.html");
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-static-v1.0", "/", "<html>shell</html>").await;
        seed(&caches, "offgrid-static-v1.0", "/about.html", "<html>about</html>").await;

        let exact = engine.handle(&get("/about.html")).await.unwrap();
        assert_eq!(exact.source, Source::Cache);
        assert_eq!(exact.response.text(), "<html>about</html>");

        let fallback = engine.handle(&get("/quiz.html")).await.unwrap();
        assert_eq!(fallback.source, Source::OfflineFallback);
        assert_eq!(fallback.response.text(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_navigation_offline_without_cache_fails() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("/quiz.html");
        let (engine, _) = engine(&fetcher);

        let result = engine.handle(&get("/quiz.html")).await;
        assert!(matches!(result, Err(e) if e.is_network_failure()));
    }

    #[tokio::test]
    async fn test_static_hit_skips_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let (engine, caches) = engine(&fetcher);
        seed(&caches, "offgrid-static-v1.0", "/app.js", "console.log(1)").await;

        let served = engine.handle(&get("/app.js")).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(fetcher.calls("/app.js"), 0);
    }

    #[tokio::test]
    async fn test_static_miss_caches_same_origin_only() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/app.css", 200, "body{}");
        fetcher.respond_kind("https://cdn.test/fa.css", 200, "", ResponseKind::Opaque);
        let (engine, caches) = engine(&fetcher);

        engine.handle(&get("/app.css")).await.unwrap();
        let cdn = Request::get(Url::parse("https://cdn.test/fa.css").unwrap());
        let served = engine.handle(&cdn).await.unwrap();
        assert_eq!(served.response.kind, ResponseKind::Opaque);

        assert_eq!(caches.partition("offgrid-static-v1.0").len().await.unwrap(), 1);

        engine.handle(&get("/app.css")).await.unwrap();
        assert_eq!(fetcher.calls("/app.css"), 1);
    }

    #[tokio::test]
    async fn test_static_miss_offline_fails() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("/logo.png");
        let (engine, _) = engine(&fetcher);

        assert!(matches!(engine.handle(&get("/logo.png")).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/farm.json", 201, "");
        let (engine, caches) = engine(&fetcher);

        let post = Request::new("POST", get("/farm.json").url);
        let served = engine.handle(&post).await.unwrap();
        assert_eq!(served.class, None);
        assert_eq!(served.response.status, 201);
        assert_eq!(caches.partitions().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_data_lookup_failure_falls_through_to_network() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/farm.json", 200, r#"{"v":2}"#);
        let (engine, caches, store) = faulty_engine(&fetcher);
        seed(&caches, "offgrid-dynamic-v1.0", "/farm.json", r#"{"v":1}"#).await;
        store.fail_reads();

        let served = engine.handle(&get("/farm.json")).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.text(), r#"{"v":2}"#);
        assert_eq!(fetcher.calls("/farm.json"), 1);
    }

    #[tokio::test]
    async fn test_navigation_write_failure_still_serves_response() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/", 200, "<html>fresh</html>");
        let (engine, caches, store) = faulty_engine(&fetcher);
        store.fail_writes_to("");

        let served = engine.handle(&get("/")).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.text(), "<html>fresh</html>");
        assert_eq!(caches.partition("offgrid-static-v1.0").len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_static_lookup_failure_fetches_from_network() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/app.js", 200, "console.log(2)");
        let (engine, caches, store) = faulty_engine(&fetcher);
        seed(&caches, "offgrid-static-v1.0", "/app.js", "console.log(1)").await;
        store.fail_reads();

        let served = engine.handle(&get("/app.js")).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.text(), "console.log(2)");
        assert_eq!(fetcher.calls("/app.js"), 1);
    }

    #[tokio::test]
    async fn test_data_miss_write_failure_still_serves_response() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("/farm.json", 200, "[]");
        let (engine, caches, store) = faulty_engine(&fetcher);
        store.fail_writes_to("/farm.json");

        let served = engine.handle(&get("/farm.json")).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.text(), "[]");
        assert_eq!(caches.partition("offgrid-dynamic-v1.0").len().await.unwrap(), 0);
    }
}
