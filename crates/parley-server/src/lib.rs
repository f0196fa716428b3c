//! # parley-server
//!
//! The relay core: one task per connected client runs the protocol state
//! machine (connect → sync → message loop → close), sharing a
//! session/topic store and a connection registry with the periodic
//! session reaper and any number of detached background tasks.
//!
//! - Connection registry: one live handle per client, typed frame fan-out
//! - Session/topic store: in-memory, append-only conversation logs
//! - Message pipeline: validation, echo, simulated token streaming,
//!   detached background tasks
//! - Session reaper: idle eviction on a fixed interval
//! - Axum server: `/health` + `/ws/{client_id}` upgrade
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod pipeline;
pub mod reaper;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod websocket;

pub use config::{ChatConfig, ServerConfig};
pub use pipeline::MessagePipeline;
pub use reaper::SessionReaper;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
pub use store::SessionStore;
pub use websocket::registry::ConnectionRegistry;
