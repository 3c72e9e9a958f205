//! Command relay: routes commands, results and terminal operations between
//! the issuing session and everyone else.

pub mod commands;
pub mod terminals;

pub use commands::CommandRelay;
