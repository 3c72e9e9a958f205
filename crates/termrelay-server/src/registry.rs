//! In-memory registry of clients, terminals and per-client command history.
//!
//! Pure data store: every operation is a synchronous map mutation. Callers
//! (the session lifecycle and the command relay) wrap it in a lock and decide
//! what to broadcast. Operations on unknown ids are no-ops whose return value
//! reports that nothing happened.

use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use termrelay_core::{
    Client, ClientStatus, Command, CommandStatus, HistoryEntry, HistoryRecord, SessionId,
    Terminal, TerminalId, Timestamp,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Registry shared between the lifecycle manager, the relay and timers.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Holds every client and terminal known to the relay.
///
/// Maps keep insertion order so listings come back in creation order.
#[derive(Debug, Default)]
pub struct Registry {
    clients: IndexMap<SessionId, Client>,
    history: IndexMap<SessionId, Vec<HistoryEntry>>,
    terminals: IndexMap<TerminalId, Terminal>,
    /// Last millisecond stamp handed out as a terminal id.
    last_terminal_stamp: i64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh registry for sharing across tasks.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    // ── Clients ─────────────────────────────────────────────────────────

    /// Register (or re-register) a client under its session id.
    ///
    /// An existing entry for the same id is overwritten and its history reset.
    pub fn create_client(&mut self, id: &str, name: Option<&str>) -> Client {
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => default_client_name(id),
        };
        let client = Client {
            id: id.to_string(),
            name,
            status: ClientStatus::Connected,
        };
        self.clients.insert(id.to_string(), client.clone());
        self.history.insert(id.to_string(), Vec::new());
        client
    }

    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn list_clients(&self) -> Vec<Client> {
        self.clients.values().cloned().collect()
    }

    /// Flip a client to `Disconnected`. Returns false for unknown ids.
    pub fn mark_client_disconnected(&mut self, id: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.status = ClientStatus::Disconnected;
                true
            }
            None => false,
        }
    }

    /// Remove a client together with its command history.
    pub fn delete_client(&mut self, id: &str) -> Option<Client> {
        self.history.shift_remove(id);
        let removed = self.clients.shift_remove(id);
        if removed.is_some() {
            debug!(session_id = %id, "client deleted");
        }
        removed
    }

    // ── Terminals ───────────────────────────────────────────────────────

    /// Create a terminal with a fresh `terminal-<millis>` id.
    pub fn create_terminal(&mut self, name: Option<&str>) -> Terminal {
        let now = Utc::now();
        let stamp = now.timestamp_millis().max(self.last_terminal_stamp + 1);
        self.last_terminal_stamp = stamp;

        let id = format!("terminal-{stamp}");
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("Terminal-{}", self.terminals.len() + 1),
        };
        let terminal = Terminal {
            id: id.clone(),
            name,
            created_at: now,
            commands: Vec::new(),
        };
        self.terminals.insert(id, terminal.clone());
        terminal
    }

    pub fn terminal(&self, id: &str) -> Option<&Terminal> {
        self.terminals.get(id)
    }

    pub fn list_terminals(&self) -> Vec<Terminal> {
        self.terminals.values().cloned().collect()
    }

    /// Rename a terminal, leaving its commands and creation time untouched.
    pub fn rename_terminal(&mut self, id: &str, name: &str) -> Option<&Terminal> {
        let terminal = self.terminals.get_mut(id)?;
        terminal.name = name.to_string();
        Some(&*terminal)
    }

    /// Empty a terminal's command log.
    pub fn clear_terminal(&mut self, id: &str) -> Option<&Terminal> {
        let terminal = self.terminals.get_mut(id)?;
        terminal.commands.clear();
        Some(&*terminal)
    }

    pub fn delete_terminal(&mut self, id: &str) -> Option<Terminal> {
        self.terminals.shift_remove(id)
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Record a submitted command.
    ///
    /// Appends to the submitting client's history when that client is
    /// registered, and to the terminal's log (status `Sent`) when the
    /// terminal exists. Either side may be missing.
    pub fn record_command(
        &mut self,
        session_id: &str,
        command: &str,
        terminal_id: &str,
        timestamp: Timestamp,
    ) {
        if let Some(history) = self.history.get_mut(session_id) {
            history.push(HistoryEntry {
                command: command.to_string(),
                timestamp,
                terminal_id: terminal_id.to_string(),
            });
        }

        if let Some(terminal) = self.terminals.get_mut(terminal_id) {
            terminal.commands.push(Command {
                command: command.to_string(),
                timestamp,
                terminal_id: terminal_id.to_string(),
                status: CommandStatus::Sent,
                result: None,
            });
        }
    }

    /// Complete the oldest pending command with matching text.
    ///
    /// Returns false when the terminal is unknown or nothing is pending
    /// under that text.
    pub fn complete_command(
        &mut self,
        terminal_id: &str,
        command: &str,
        result: Option<&str>,
    ) -> bool {
        let Some(terminal) = self.terminals.get_mut(terminal_id) else {
            return false;
        };
        match terminal
            .commands
            .iter_mut()
            .find(|c| c.command == command && c.status == CommandStatus::Sent)
        {
            Some(pending) => {
                pending.status = CommandStatus::Completed;
                pending.result = result.map(str::to_string);
                true
            }
            None => false,
        }
    }

    // ── History ─────────────────────────────────────────────────────────

    /// Command history of one client.
    pub fn history(&self, id: &str) -> Option<&[HistoryEntry]> {
        self.history.get(id).map(Vec::as_slice)
    }

    /// Every client's history flattened into one list, tagged by client id.
    pub fn history_snapshot(&self) -> Vec<HistoryRecord> {
        self.history
            .iter()
            .flat_map(|(client_id, entries)| {
                entries.iter().map(move |entry| HistoryRecord {
                    entry: entry.clone(),
                    client_id: client_id.clone(),
                })
            })
            .collect()
    }
}

/// `Client-` plus the first five characters of the session id.
fn default_client_name(id: &str) -> String {
    let short: String = id.chars().take(5).collect();
    format!("Client-{short}")
}
