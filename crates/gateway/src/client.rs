//! Client state and the connection registry.
//!
//! The registry is a DashMap keyed by connection ID. It only exposes
//! insert/remove/get and a snapshot of IDs, so fan-out never iterates the
//! map while a connection task is mutating it.

use crate::error::{GatewayError, Result};
use crate::protocol::ServerMessage;
use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque connection identifier. Also the person ID in Tile38.
pub type ClientId = String;

/// Buffer size for client message channels.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// Generate a fresh connection ID (32 hex chars, no `:` so it is safe as a
/// channel suffix).
pub fn new_client_id() -> ClientId {
    Uuid::new_v4().simple().to_string()
}

/// State for a single connected client.
pub struct ClientState {
    pub id: ClientId,
    /// Channel to the client's WebSocket writer task.
    pub tx: mpsc::Sender<Message>,
}

impl ClientState {
    /// Create client state with a fresh ID.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: new_client_id(),
            tx,
        }
    }

    /// Send a typed message. Non-blocking: fails if the buffer is full.
    pub fn send(&self, msg: ServerMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .try_send(Message::Text(json.into()))
            .map_err(|_| GatewayError::ChannelSend)
    }

    /// Send pre-serialized text. Returns false if the client is slow or gone.
    pub fn try_send_text(&self, text: &str) -> bool {
        self.tx.try_send(Message::Text(text.into())).is_ok()
    }
}

/// Registry of live connections.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientState>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a client, returning its ID.
    pub fn insert(&self, client: Arc<ClientState>) -> ClientId {
        let id = client.id.clone();
        self.clients.insert(id.clone(), client);
        info!("Client {} registered", id);
        id
    }

    /// Unregister a client. Removing an unknown ID is a no-op.
    pub fn remove(&self, client_id: &str) -> Option<Arc<ClientState>> {
        let removed = self.clients.remove(client_id).map(|(_, c)| c);
        if removed.is_some() {
            info!("Client {} unregistered", client_id);
        }
        removed
    }

    /// Look up a live client.
    pub fn get(&self, client_id: &str) -> Option<Arc<ClientState>> {
        self.clients.get(client_id).map(|r| r.clone())
    }

    /// IDs of every client registered at the time of the call.
    pub fn snapshot_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send pre-serialized text to every registered client, returning how
    /// many accepted it. Slow clients are skipped, never awaited.
    pub fn broadcast_text(&self, text: &str) -> usize {
        let mut delivered = 0;
        for id in self.snapshot_ids() {
            if let Some(client) = self.get(&id) {
                if client.try_send_text(text) {
                    delivered += 1;
                } else {
                    debug!("Dropped message for slow or closed client {}", id);
                }
            }
        }
        delivered
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
