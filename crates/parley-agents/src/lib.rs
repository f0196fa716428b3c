//! # parley-agents
//!
//! The agent catalog (a static, read-only directory of available agents)
//! and the [`ReplyBackend`] seam behind which a real generation backend
//! can be substituted without touching the protocol state machine.

#![deny(unsafe_code)]

pub mod backend;
pub mod catalog;

pub use backend::{ReplyBackend, SimulatedBackend};
pub use catalog::AgentCatalog;
