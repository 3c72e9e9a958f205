//! Terminal operations. Replies go to the requesting session only; unknown
//! terminal ids are ignored without a reply.

use super::CommandRelay;
use termrelay_core::messages::TerminalRefPayload;
use termrelay_core::{OutboundEvent, Terminal};
use tracing::info;

impl CommandRelay {
    /// Create a terminal and send it back to the requester.
    pub async fn create_terminal(&self, session_id: &str, name: Option<&str>) -> Terminal {
        let mut registry = self.registry.write().await;
        let terminal = registry.create_terminal(name);
        self.gateway
            .send_to_one(session_id, OutboundEvent::TerminalCreated(terminal.clone()))
            .await;
        info!(session_id, terminal_id = %terminal.id, name = %terminal.name, "terminal created");
        terminal
    }

    pub async fn rename_terminal(
        &self,
        session_id: &str,
        terminal_id: &str,
        name: &str,
    ) -> Option<Terminal> {
        let mut registry = self.registry.write().await;
        let terminal = registry.rename_terminal(terminal_id, name)?.clone();
        self.gateway
            .send_to_one(session_id, OutboundEvent::TerminalRenamed(terminal.clone()))
            .await;
        info!(session_id, terminal_id, name, "terminal renamed");
        Some(terminal)
    }

    /// Empty a terminal's command log. Returns false for unknown terminals.
    pub async fn clear_terminal(&self, session_id: &str, terminal_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(name) = registry.clear_terminal(terminal_id).map(|t| t.name.clone()) else {
            return false;
        };
        self.gateway
            .send_to_one(
                session_id,
                OutboundEvent::TerminalCleared(TerminalRefPayload {
                    terminal_id: terminal_id.to_string(),
                }),
            )
            .await;
        info!(session_id, terminal_id, name = %name, "terminal cleared");
        true
    }

    /// Delete a terminal. Returns false for unknown terminals.
    pub async fn close_terminal(&self, session_id: &str, terminal_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(closed) = registry.delete_terminal(terminal_id) else {
            return false;
        };
        self.gateway
            .send_to_one(
                session_id,
                OutboundEvent::TerminalClosed(TerminalRefPayload {
                    terminal_id: terminal_id.to_string(),
                }),
            )
            .await;
        info!(session_id, terminal_id, name = %closed.name, "terminal closed");
        true
    }
}
