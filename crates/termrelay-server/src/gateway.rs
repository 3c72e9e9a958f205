//! Broadcast gateway: fan-out of outbound events to connected sessions.
//!
//! Each attached session owns an unbounded queue drained by its transport
//! task. Sending never blocks; an event is only dropped once the session has
//! detached or its receiver is gone.

use std::collections::HashMap;
use termrelay_core::{OutboundEvent, SessionId};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::debug;

/// Per-session outbound queues, keyed by session id.
#[derive(Default)]
pub struct BroadcastGateway {
    senders: RwLock<HashMap<SessionId, mpsc::UnboundedSender<OutboundEvent>>>,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session and return the receiving end of its queue.
    ///
    /// Attaching an id twice replaces the previous queue.
    pub async fn attach(&self, session_id: &str) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.insert(session_id.to_string(), tx);
        rx
    }

    /// Detach a session; later events addressed to it are dropped.
    pub async fn detach(&self, session_id: &str) -> bool {
        self.senders.write().await.remove(session_id).is_some()
    }

    pub async fn is_attached(&self, session_id: &str) -> bool {
        self.senders.read().await.contains_key(session_id)
    }

    /// Number of attached sessions.
    pub async fn count(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Deliver an event to every attached session, the originator included.
    ///
    /// Returns how many queues accepted it.
    pub async fn broadcast_to_all(&self, event: OutboundEvent) -> usize {
        let senders = self.senders.read().await;
        let mut delivered = 0;
        for (session_id, tx) in senders.iter() {
            if deliver(session_id, tx, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver an event to a single session. Returns false if it was dropped.
    pub async fn send_to_one(&self, session_id: &str, event: OutboundEvent) -> bool {
        let senders = self.senders.read().await;
        match senders.get(session_id) {
            Some(tx) => deliver(session_id, tx, event),
            None => {
                debug!(session_id, event = event.name(), "no such session, event dropped");
                false
            }
        }
    }
}

fn deliver(
    session_id: &str,
    tx: &mpsc::UnboundedSender<OutboundEvent>,
    event: OutboundEvent,
) -> bool {
    match tx.send(event) {
        Ok(()) => true,
        Err(mpsc::error::SendError(event)) => {
            debug!(session_id, event = event.name(), "session queue closed, event dropped");
            false
        }
    }
}
