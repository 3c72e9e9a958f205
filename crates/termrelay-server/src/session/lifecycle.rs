//! Session lifecycle: connect, register, disconnect and delayed eviction.
//!
//! A connection moves through `Connecting → Registered → Disconnected →
//! Evicted`. A disconnected client stays listed for a grace period so other
//! sessions see it go offline before it disappears.

use crate::gateway::BroadcastGateway;
use crate::registry::SharedRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use termrelay_core::{Client, ClientStatus, OutboundEvent, SessionId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default grace period before a disconnected client is evicted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Where a session currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport attached, no client registered yet.
    Connecting,
    /// Registered client, transport attached.
    Registered,
    /// Client still listed, waiting out the grace period.
    Disconnected,
    /// No trace left in the registry or gateway (also reported for ids never seen).
    Evicted,
}

/// Pending eviction timers, keyed by client id.
type EvictionTable = Arc<Mutex<HashMap<SessionId, JoinHandle<()>>>>;

/// Drives client registration and cleanup against the shared registry.
pub struct SessionLifecycle {
    registry: SharedRegistry,
    gateway: Arc<BroadcastGateway>,
    grace_period: Duration,
    evictions: EvictionTable,
}

impl SessionLifecycle {
    pub fn new(
        registry: SharedRegistry,
        gateway: Arc<BroadcastGateway>,
        grace_period: Duration,
    ) -> Self {
        Self {
            registry,
            gateway,
            grace_period,
            evictions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Accept a new transport connection.
    ///
    /// Assigns a fresh session id and attaches its outbound queue. Nothing is
    /// written to the registry until the session registers.
    pub async fn connect(&self) -> (SessionId, mpsc::UnboundedReceiver<OutboundEvent>) {
        let session_id = generate_session_id();
        let rx = self.gateway.attach(&session_id).await;
        info!(session_id = %session_id, "new client connected");
        (session_id, rx)
    }

    /// Register the session as a client and broadcast the new client list.
    ///
    /// Calling this again on the same session overwrites the client and
    /// resets its command history.
    pub async fn register(&self, session_id: &str, name: Option<&str>) -> Client {
        self.cancel_eviction(session_id).await;

        let mut registry = self.registry.write().await;
        let client = registry.create_client(session_id, name);
        self.gateway
            .broadcast_to_all(OutboundEvent::ClientListUpdated(registry.list_clients()))
            .await;
        info!(session_id, name = %client.name, "client registered");
        client
    }

    /// Handle a transport disconnect.
    ///
    /// Detaches the session's queue. A registered client is marked
    /// disconnected, the list is broadcast, and eviction is scheduled.
    pub async fn disconnect(&self, session_id: &str) {
        self.gateway.detach(session_id).await;
        info!(session_id, "client disconnected");

        {
            let mut registry = self.registry.write().await;
            if !registry.mark_client_disconnected(session_id) {
                return;
            }
            self.gateway
                .broadcast_to_all(OutboundEvent::ClientListUpdated(registry.list_clients()))
                .await;
        }

        self.schedule_eviction(session_id).await;
    }

    /// Current lifecycle state of a session.
    pub async fn state(&self, session_id: &str) -> SessionState {
        let status = self.registry.read().await.client(session_id).map(|c| c.status);
        match status {
            Some(ClientStatus::Connected) => SessionState::Registered,
            Some(ClientStatus::Disconnected) => SessionState::Disconnected,
            None if self.gateway.is_attached(session_id).await => SessionState::Connecting,
            None => SessionState::Evicted,
        }
    }

    /// Number of eviction timers still waiting to fire.
    pub async fn pending_evictions(&self) -> usize {
        self.evictions.lock().await.len()
    }

    /// Abort every pending eviction timer.
    pub async fn shutdown(&self) {
        let mut evictions = self.evictions.lock().await;
        for (_, handle) in evictions.drain() {
            handle.abort();
        }
    }

    async fn schedule_eviction(&self, session_id: &str) {
        let registry = self.registry.clone();
        let gateway = self.gateway.clone();
        let table = self.evictions.clone();
        let grace = self.grace_period;
        let id = session_id.to_string();

        // Hold the table lock across spawn + insert so the task's own removal
        // always runs after its handle is stored.
        let mut evictions = self.evictions.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            evict(&registry, &gateway, &id).await;
            table.lock().await.remove(&id);
        });
        if let Some(previous) = evictions.insert(session_id.to_string(), handle) {
            previous.abort();
        }
        debug!(session_id, grace_secs = grace.as_secs(), "eviction scheduled");
    }

    async fn cancel_eviction(&self, session_id: &str) {
        if let Some(handle) = self.evictions.lock().await.remove(session_id) {
            handle.abort();
            debug!(session_id, "eviction cancelled");
        }
    }
}

/// Delete a client if it is still disconnected once the grace period ends.
async fn evict(registry: &SharedRegistry, gateway: &BroadcastGateway, session_id: &str) -> bool {
    let mut registry = registry.write().await;
    let still_disconnected = matches!(
        registry.client(session_id),
        Some(client) if client.status == ClientStatus::Disconnected
    );
    if !still_disconnected {
        return false;
    }

    let discarded = registry.history(session_id).map_or(0, <[_]>::len);
    registry.delete_client(session_id);
    gateway
        .broadcast_to_all(OutboundEvent::ClientListUpdated(registry.list_clients()))
        .await;
    info!(session_id, discarded, "client evicted after grace period");
    true
}

/// Generate a random session ID (hex-encoded, 16 bytes = 32 hex chars).
fn generate_session_id() -> SessionId {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
