//! termrelay-core: shared protocol library for the terminal relay.
//!
//! Provides the registry entity types (clients, terminals, commands), the
//! named inbound/outbound events exchanged with connected sessions, and the
//! JSON text-frame codec used on the wire.

pub mod codec;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_event, encode_event};
pub use error::{RelayError, RelayResult};
pub use messages::{
    Client, ClientStatus, Command, CommandStatus, HistoryEntry, HistoryRecord, InboundEvent,
    OutboundEvent, SessionId, Terminal, TerminalId, Timestamp,
};
