//! Inbound signal handling: control messages, push and periodic sync.
//!
//! None of these ever fail the caller. Malformed input is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::clients::{ClientMessage, ClientRegistry};

/// Recognized control messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Stop waiting for old instances and activate as soon as installed.
    #[serde(alias = "skip-waiting", alias = "SKIP_WAITING")]
    AdvanceToInstalled,
    /// Store `payload` as a JSON entry under `key` in the dynamic partition.
    #[serde(alias = "CACHE_QUIZ_DATA")]
    PrimeNamedEntry {
        #[serde(default = "default_prime_key")]
        key: String,
        #[serde(alias = "data")]
        payload: serde_json::Value,
    },
    #[serde(other)]
    Unrecognized,
}

fn default_prime_key() -> String {
    "/quiz-data".into()
}

impl ControlMessage {
    /// Parse a raw message. Anything that is not a recognized command
    /// yields `None`.
    pub fn parse(raw: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value::<Self>(raw.clone()) {
            Ok(ControlMessage::Unrecognized) => {
                tracing::debug!(message = %raw, "ignoring unrecognized control message");
                None
            }
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(message = %raw, error = %e, "ignoring malformed control message");
                None
            }
        }
    }
}

/// Notification built from a push signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct PushNotice {
    pub title: String,
    pub body: String,
}

impl PushNotice {
    /// Empty or missing payloads fall back to `default_body`.
    pub fn from_payload(payload: Option<&str>, title: &str, default_body: &str) -> Self {
        let body = payload.map(str::trim).filter(|text| !text.is_empty()).unwrap_or(default_body);
        Self { title: title.to_string(), body: body.to_string() }
    }
}

/// Work run for a periodic-sync tag.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn run(&self, tag: &str);
}

/// Tells every client that data may have changed.
pub struct NotifyClients {
    clients: Arc<ClientRegistry>,
}

impl NotifyClients {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl SyncHandler for NotifyClients {
    async fn run(&self, tag: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let delivered = self.clients.post_all(ClientMessage::DataChanged { timestamp });
        tracing::info!(tag, delivered, "sync broadcast data change");
    }
}

/// Maps sync tags to handlers.
#[derive(Default)]
pub struct SyncRegistry {
    handlers: HashMap<String, Arc<dyn SyncHandler>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn SyncHandler>) {
        self.handlers.insert(tag.into(), handler);
    }

    /// Run the handler for `tag`. Returns false when the tag is unknown.
    pub async fn dispatch(&self, tag: &str) -> bool {
        match self.handlers.get(tag) {
            Some(handler) => {
                handler.run(tag).await;
                true
            }
            None => {
                tracing::debug!(tag, "ignoring unknown sync tag");
                false
            }
        }
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}
