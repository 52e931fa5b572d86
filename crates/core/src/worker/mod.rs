//! The request-interception proxy.
//!
//! [`Worker`] wires the pieces together:
//!
//! - [`classify`] maps a request to a [`ResourceClass`]
//! - [`StrategyEngine`] answers requests from the cache and the network
//! - [`GenerationManager`] populates and purges generations
//! - [`LifecycleController`] sequences install and activation
//! - [`hooks`] handles control messages, push and periodic sync

pub mod classify;
pub mod clients;
pub mod generation;
pub mod hooks;
pub mod lifecycle;
pub mod strategy;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use serde::Serialize;

pub use classify::{ResourceClass, classify};
pub use clients::{ClientMessage, ClientRegistry};
pub use generation::{ActivateReport, GenerationManager, InstallReport, ManifestFailure};
pub use hooks::{ControlMessage, NotifyClients, PushNotice, SyncHandler, SyncRegistry};
pub use lifecycle::{InstallOutcome, LifecycleController, LifecycleState};
pub use strategy::{Served, Source, StrategyEngine};

use crate::Error;
use crate::cache::{CacheStore, Caches};
use crate::config::CacheConfig;
use crate::http::{Fetcher, Request, Response};

/// What a control message did.
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Ignored,
    SkipWaiting { activation: Option<ActivateReport> },
    Primed { url: String },
}

/// One proxy instance bound to a single generation.
pub struct Worker {
    config: Arc<CacheConfig>,
    caches: Caches,
    engine: StrategyEngine,
    lifecycle: LifecycleController,
    clients: Arc<ClientRegistry>,
    sync: SyncRegistry,
}

impl Worker {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        let config = Arc::new(config);
        let caches = Caches::new(store);
        let clients = Arc::new(ClientRegistry::new());

        let engine = StrategyEngine::new(caches.clone(), Arc::clone(&fetcher), Arc::clone(&config));
        let generations = GenerationManager::new(caches.clone(), fetcher, Arc::clone(&config));
        let lifecycle = LifecycleController::new(generations, Arc::clone(&clients), Arc::clone(&config));

        let mut sync = SyncRegistry::new();
        let notify: Arc<dyn SyncHandler> = Arc::new(NotifyClients::new(Arc::clone(&clients)));
        for tag in &config.sync_tags {
            sync.register(tag.clone(), Arc::clone(&notify));
        }

        Self { config, caches, engine, lifecycle, clients, sync }
    }

    pub async fn install(&self) -> Result<InstallOutcome, Error> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.activate().await
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Answer an intercepted request.
    ///
    /// Requests arrive at the network untouched when they are not GET, when
    /// this instance is not active yet, or when they come from a client it
    /// does not control.
    pub async fn intercept(&self, request: &Request) -> Result<Served, Error> {
        if !self.lifecycle.is_serving() {
            tracing::debug!(url = %request.url, state = %self.state(), "not active, passing through");
            return self.engine.pass_through(request).await;
        }
        if let Some(client) = request.client_id {
            if !self.clients.is_controlled(client).await {
                tracing::debug!(url = %request.url, client, "uncontrolled client, passing through");
                return self.engine.pass_through(request).await;
            }
        }
        self.engine.handle(request).await
    }

    /// Handle an inbound control message. Never fails; problems are logged.
    pub async fn on_message(&self, raw: &serde_json::Value) -> MessageOutcome {
        match ControlMessage::parse(raw) {
            Some(ControlMessage::AdvanceToInstalled) => match self.lifecycle.skip_waiting().await {
                Ok(activation) => MessageOutcome::SkipWaiting { activation },
                Err(e) => {
                    tracing::warn!(error = %e, "skip-waiting activation failed");
                    MessageOutcome::SkipWaiting { activation: None }
                }
            },
            Some(ControlMessage::PrimeNamedEntry { key, payload }) => self.prime(&key, &payload).await,
            Some(ControlMessage::Unrecognized) | None => MessageOutcome::Ignored,
        }
    }

    async fn prime(&self, key: &str, payload: &serde_json::Value) -> MessageOutcome {
        let url = match self.config.resolve(key) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring prime with unresolvable key");
                return MessageOutcome::Ignored;
            }
        };

        let request = Request::get(url);
        let cache_key = self.config.key_for(&request);
        let response = Response::synthetic_json(request.url.as_str(), payload);
        let dynamic = self.caches.partition(&self.config.dynamic_partition);
        match dynamic.put(&cache_key, &response).await {
            Ok(()) => {
                tracing::info!(url = %request.url, "primed dynamic entry");
                MessageOutcome::Primed { url: request.url.to_string() }
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "failed to prime entry");
                MessageOutcome::Ignored
            }
        }
    }

    /// Turn a push signal into a notice and broadcast it.
    pub fn on_push(&self, payload: Option<&str>) -> PushNotice {
        let notice = PushNotice::from_payload(payload, &self.config.push_title, &self.config.push_default_body);
        self.clients.post_all(ClientMessage::Push { title: notice.title.clone(), body: notice.body.clone() });
        notice
    }

    /// Run the handler registered for `tag`. Returns false for unknown tags.
    pub async fn on_sync(&self, tag: &str) -> bool {
        self.sync.dispatch(tag).await
    }

    /// Register a client. Clients that connect to an active instance are
    /// controlled right away.
    pub async fn connect_client(&self) -> u64 {
        self.clients.connect(self.lifecycle.is_serving()).await
    }

    /// Forget a client. Returns false if it was not connected.
    pub async fn disconnect_client(&self, id: u64) -> bool {
        self.clients.disconnect(id).await
    }

    /// Sync tags with a registered handler, sorted.
    pub fn sync_tags(&self) -> Vec<&str> {
        self.sync.tags()
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Wait for outstanding background refreshes.
    pub async fn settle(&self) {
        self.engine.settle().await;
    }
}
