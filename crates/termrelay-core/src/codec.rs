//! JSON text-frame codec for relay events.
//!
//! Wire format: one WebSocket text frame per event,
//! `{"event": "<name>", "data": <payload>}`.

use crate::error::{RelayError, RelayResult};

/// Encode an event into a JSON text frame.
pub fn encode_event<T: serde::Serialize>(event: &T) -> RelayResult<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a JSON text frame into a typed event.
pub fn decode_event<T: serde::de::DeserializeOwned>(text: &str) -> RelayResult<T> {
    if text.trim().is_empty() {
        return Err(RelayError::InvalidMessage("empty frame".into()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn decode_execute_command() {
        let text = r#"{"event":"execute_command","data":{"command":"ls -la","terminalId":"terminal-1"}}"#;
        let event: InboundEvent = decode_event(text).unwrap();
        assert_eq!(
            event,
            InboundEvent::ExecuteCommand(ExecuteCommandPayload {
                command: "ls -la".into(),
                terminal_id: "terminal-1".into(),
            })
        );
        assert_eq!(event.name(), "execute_command");
    }

    #[test]
    fn decode_tolerates_missing_fields() {
        let event: InboundEvent =
            decode_event(r#"{"event":"register_client","data":{}}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::RegisterClient(RegisterClientPayload { name: None })
        );

        // The browser console sends stop_command without a command.
        let event: InboundEvent =
            decode_event(r#"{"event":"stop_command","data":{"terminalId":"t"}}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::StopCommand(StopCommandPayload {
                command: None,
                terminal_id: "t".into(),
            })
        );
    }

    #[test]
    fn decode_unknown_event_fails() {
        let result: RelayResult<InboundEvent> =
            decode_event(r#"{"event":"self_destruct","data":{}}"#);
        assert!(matches!(result, Err(RelayError::Codec(_))));
    }

    #[test]
    fn decode_garbage_fails() {
        let result: RelayResult<InboundEvent> = decode_event("not json");
        assert!(matches!(result, Err(RelayError::Codec(_))));
    }

    #[test]
    fn decode_empty_frame_fails() {
        let result: RelayResult<InboundEvent> = decode_event("  ");
        assert!(matches!(result, Err(RelayError::InvalidMessage(_))));
    }

    #[test]
    fn encode_client_list_as_array() {
        let event = OutboundEvent::ClientListUpdated(vec![Client {
            id: "abc".into(),
            name: "Web Terminal".into(),
            status: ClientStatus::Disconnected,
        }]);
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(value["event"], "client_list_updated");
        assert_eq!(value["data"][0]["name"], "Web Terminal");
        assert_eq!(value["data"][0]["status"], "disconnected");
    }

    #[test]
    fn encode_terminal_uses_camel_case() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = OutboundEvent::TerminalCreated(Terminal {
            id: "terminal-1714564800000".into(),
            name: "T1".into(),
            created_at,
            commands: vec![Command {
                command: "ls".into(),
                timestamp: created_at,
                terminal_id: "terminal-1714564800000".into(),
                status: CommandStatus::Sent,
                result: None,
            }],
        });
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(value["event"], "terminal_created");
        assert_eq!(value["data"]["createdAt"], "2024-05-01T12:00:00Z");
        assert_eq!(value["data"]["commands"][0]["status"], "sent");
        assert_eq!(value["data"]["commands"][0]["terminalId"], "terminal-1714564800000");
        assert!(value["data"]["commands"][0].get("result").is_none());
    }

    #[test]
    fn encode_command_to_execute() {
        let event = OutboundEvent::CommandToExecute(CommandToExecutePayload {
            command: "uptime".into(),
            terminal_id: "terminal-7".into(),
            source_id: "deadbeef".into(),
        });
        let text = encode_event(&event).unwrap();
        assert_eq!(
            text,
            r#"{"event":"command_to_execute","data":{"command":"uptime","terminalId":"terminal-7","sourceId":"deadbeef"}}"#
        );
    }

    #[test]
    fn history_record_is_flattened() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = HistoryRecord {
            entry: HistoryEntry {
                command: "pwd".into(),
                timestamp,
                terminal_id: "terminal-1".into(),
            },
            client_id: "c1".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["command"], "pwd");
        assert_eq!(value["terminalId"], "terminal-1");
        assert_eq!(value["clientId"], "c1");
    }
}
