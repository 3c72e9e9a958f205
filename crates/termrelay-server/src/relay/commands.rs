//! Command routing between consoles and executors.
//!
//! Commands and results are correlated only by terminal id plus command
//! text: a result completes the oldest pending command with the same text.

use crate::gateway::BroadcastGateway;
use crate::registry::SharedRegistry;
use chrono::Utc;
use std::sync::Arc;
use termrelay_core::messages::{
    CommandResultReceivedPayload, CommandSentPayload, CommandToExecutePayload, StopCommandPayload,
};
use termrelay_core::OutboundEvent;
use tracing::{debug, info};

/// Relays commands, results and terminal operations.
pub struct CommandRelay {
    pub(super) registry: SharedRegistry,
    pub(super) gateway: Arc<BroadcastGateway>,
}

impl CommandRelay {
    pub fn new(registry: SharedRegistry, gateway: Arc<BroadcastGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Record a command and hand it to every connected session.
    ///
    /// `command_to_execute` goes to all sessions, the sender included; the
    /// sender alone also gets a `command_sent` acknowledgement.
    pub async fn execute_command(&self, session_id: &str, command: &str, terminal_id: &str) {
        info!(session_id, terminal_id, command, "command received");
        let now = Utc::now();

        let mut registry = self.registry.write().await;
        if registry.terminal(terminal_id).is_none() {
            debug!(terminal_id, "command for unknown terminal, relaying anyway");
        }
        registry.record_command(session_id, command, terminal_id, now);

        self.gateway
            .broadcast_to_all(OutboundEvent::CommandToExecute(CommandToExecutePayload {
                command: command.to_string(),
                terminal_id: terminal_id.to_string(),
                source_id: session_id.to_string(),
            }))
            .await;
        self.gateway
            .send_to_one(
                session_id,
                OutboundEvent::CommandSent(CommandSentPayload {
                    command: command.to_string(),
                    terminal_id: terminal_id.to_string(),
                    timestamp: now,
                }),
            )
            .await;
    }

    /// Apply an executor's result and forward it to every session.
    ///
    /// The result is broadcast even when no pending command matched.
    /// Returns whether a command was completed.
    pub async fn command_result(
        &self,
        command: &str,
        result: Option<&str>,
        terminal_id: &str,
    ) -> bool {
        info!(terminal_id, command, "command result received");

        let mut registry = self.registry.write().await;
        let completed = registry.complete_command(terminal_id, command, result);
        if !completed {
            debug!(terminal_id, command, "no pending command matched result");
        }

        self.gateway
            .broadcast_to_all(OutboundEvent::CommandResultReceived(
                CommandResultReceivedPayload {
                    command: command.to_string(),
                    result: result.map(str::to_string),
                    terminal_id: terminal_id.to_string(),
                    timestamp: Utc::now(),
                },
            ))
            .await;
        completed
    }

    /// Ask whichever executor runs the command to stop it. Best effort only.
    pub async fn stop_command(&self, command: Option<&str>, terminal_id: &str) {
        info!(terminal_id, command = command.unwrap_or_default(), "stop command");
        self.gateway
            .broadcast_to_all(OutboundEvent::StopCommandRequest(StopCommandPayload {
                command: command.map(str::to_string),
                terminal_id: terminal_id.to_string(),
            }))
            .await;
    }
}
