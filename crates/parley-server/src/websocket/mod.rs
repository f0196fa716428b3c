//! WebSocket layer: per-client connection handles, the connection
//! registry, and the per-connection protocol state machine.

pub mod connection;
pub mod registry;
pub mod session;
