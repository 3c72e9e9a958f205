//! Session lifecycle management: registration, disconnect, grace-period eviction.

pub mod lifecycle;

pub use lifecycle::{SessionLifecycle, SessionState, DEFAULT_GRACE_PERIOD};
