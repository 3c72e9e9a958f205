//! Relay entities and the named events exchanged with sessions.
//!
//! Every event travels as `{"event": "<snake_case name>", "data": <payload>}`.
//! Payload field names are camelCase to match the browser console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport-assigned identifier of a connected session.
pub type SessionId = String;

/// Identifier of a logical terminal (`terminal-<unix millis>`).
pub type TerminalId = String;

/// Wall-clock timestamp attached to terminals and commands.
pub type Timestamp = DateTime<Utc>;

// ── Entities ────────────────────────────────────────────────────────────

/// Connection status of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Connected,
    Disconnected,
}

/// A registered session's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: SessionId,
    pub name: String,
    pub status: ClientStatus,
}

/// Lifecycle of a relayed command. Only ever moves `Sent` → `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Sent,
    Completed,
}

/// A command recorded against a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub command: String,
    pub timestamp: Timestamp,
    pub terminal_id: TerminalId,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A logical command console with its own command log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    pub id: TerminalId,
    pub name: String,
    pub created_at: Timestamp,
    pub commands: Vec<Command>,
}

/// One entry of a client's command history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub command: String,
    pub timestamp: Timestamp,
    pub terminal_id: TerminalId,
}

/// A history entry tagged with the client that submitted it, as returned by
/// the flattened history snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub client_id: SessionId,
}

// ── Inbound (session → relay) ───────────────────────────────────────────

/// Events a session may send to the relay.
///
/// Payload fields are not validated; anything missing takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    RegisterClient(RegisterClientPayload),
    CreateTerminal(CreateTerminalPayload),
    RenameTerminal(RenameTerminalPayload),
    ExecuteCommand(ExecuteCommandPayload),
    CommandResult(CommandResultPayload),
    StopCommand(StopCommandPayload),
    ClearTerminal(TerminalRefPayload),
    CloseTerminal(TerminalRefPayload),
}

impl InboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterClient(_) => "register_client",
            Self::CreateTerminal(_) => "create_terminal",
            Self::RenameTerminal(_) => "rename_terminal",
            Self::ExecuteCommand(_) => "execute_command",
            Self::CommandResult(_) => "command_result",
            Self::StopCommand(_) => "stop_command",
            Self::ClearTerminal(_) => "clear_terminal",
            Self::CloseTerminal(_) => "close_terminal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterClientPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTerminalPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenameTerminalPayload {
    pub terminal_id: TerminalId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecuteCommandPayload {
    pub command: String,
    pub terminal_id: TerminalId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandResultPayload {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub terminal_id: TerminalId,
}

/// Shared by the inbound `stop_command` and the outbound `stop_command_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StopCommandPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub terminal_id: TerminalId,
}

/// Payload that only names a terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerminalRefPayload {
    pub terminal_id: TerminalId,
}

// ── Outbound (relay → sessions) ─────────────────────────────────────────

/// Events the relay sends to one or all sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Full client list; sent to all sessions.
    ClientListUpdated(Vec<Client>),
    /// Sender only.
    TerminalCreated(Terminal),
    /// Sender only.
    TerminalRenamed(Terminal),
    /// All sessions, sender included.
    CommandToExecute(CommandToExecutePayload),
    /// Sender only.
    CommandSent(CommandSentPayload),
    /// All sessions.
    CommandResultReceived(CommandResultReceivedPayload),
    /// All sessions.
    StopCommandRequest(StopCommandPayload),
    /// Sender only.
    TerminalCleared(TerminalRefPayload),
    /// Sender only.
    TerminalClosed(TerminalRefPayload),
}

impl OutboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientListUpdated(_) => "client_list_updated",
            Self::TerminalCreated(_) => "terminal_created",
            Self::TerminalRenamed(_) => "terminal_renamed",
            Self::CommandToExecute(_) => "command_to_execute",
            Self::CommandSent(_) => "command_sent",
            Self::CommandResultReceived(_) => "command_result_received",
            Self::StopCommandRequest(_) => "stop_command_request",
            Self::TerminalCleared(_) => "terminal_cleared",
            Self::TerminalClosed(_) => "terminal_closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandToExecutePayload {
    pub command: String,
    pub terminal_id: TerminalId,
    pub source_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSentPayload {
    pub command: String,
    pub terminal_id: TerminalId,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultReceivedPayload {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub terminal_id: TerminalId,
    pub timestamp: Timestamp,
}
