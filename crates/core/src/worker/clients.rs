//! Connected clients and outbound messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

const CHANNEL_CAPACITY: usize = 64;

/// Message pushed to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Data resources may have changed; clients should re-read them.
    DataChanged { timestamp: String },
    /// A push signal arrived.
    Push { title: String, body: String },
}

/// Registry of connected clients.
///
/// A client is either controlled by this instance, and has its requests
/// answered by the strategy engine, or not yet, in which case its requests go
/// straight to the network until a claim.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<u64, bool>>,
    next_id: AtomicU64,
    outbound: broadcast::Sender<ClientMessage>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        let (outbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { clients: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1), outbound }
    }

    /// Register a client and return its id.
    pub async fn connect(&self, controlled: bool) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, controlled);
        tracing::debug!(client = id, controlled, "client connected");
        id
    }

    pub async fn disconnect(&self, id: u64) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(client = id, "client disconnected");
        }
        removed
    }

    pub async fn contains(&self, id: u64) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    /// Connected client ids, ascending.
    pub async fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.clients.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_controlled(&self, id: u64) -> bool {
        self.clients.read().await.get(&id).copied().unwrap_or(false)
    }

    /// Take control of every connected client. Returns how many changed hands.
    pub async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for controlled in clients.values_mut().filter(|c| !**c) {
            *controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Send `message` to every subscriber. Returns the number of receivers;
    /// having none is not an error.
    pub fn post_all(&self, message: ClientMessage) -> usize {
        match self.outbound.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("no subscribers for client message");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.outbound.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_takes_uncontrolled_clients() {
        let registry = ClientRegistry::new();
        let a = registry.connect(false).await;
        let b = registry.connect(true).await;
        assert!(!registry.is_controlled(a).await);

        assert_eq!(registry.claim().await, 1);
        assert!(registry.is_controlled(a).await);
        assert!(registry.is_controlled(b).await);
        assert_eq!(registry.claim().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_client_is_uncontrolled() {
        let registry = ClientRegistry::new();
        let id = registry.connect(true).await;
        assert!(registry.contains(id).await);
        assert!(registry.disconnect(id).await);
        assert!(!registry.disconnect(id).await);
        assert!(!registry.contains(id).await);
        assert!(!registry.is_controlled(id).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_ids_are_sorted() {
        let registry = ClientRegistry::new();
        let a = registry.connect(true).await;
        let b = registry.connect(false).await;
        let c = registry.connect(true).await;
        registry.disconnect(b).await;
        assert_eq!(registry.ids().await, vec![a, c]);
    }

    #[tokio::test]
    async fn test_post_all_reaches_subscribers() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.post_all(ClientMessage::DataChanged { timestamp: "t0".into() }), 0);

        let mut rx = registry.subscribe();
        let message = ClientMessage::Push { title: "offgrid".into(), body: "hi".into() };
        assert_eq!(registry.post_all(message.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), message);
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(ClientMessage::DataChanged { timestamp: "2024-01-01T00:00:00Z".into() }).unwrap();
        assert_eq!(json["type"], "data-changed");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
    }
}
