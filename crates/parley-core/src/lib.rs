//! # parley-core
//!
//! Shared vocabulary for the Parley chat relay:
//!
//! - **Branded IDs**: `ClientId`, `TopicId`, `MessageId`, `TaskResultId`,
//!   `AgentId` as newtypes for type safety
//! - **Domain model**: `Session`, `Topic`, `Message`, `TaskResult`
//! - **Errors**: `ChatError` hierarchy via `thiserror`
//! - **Wire frames**: closed tagged unions for both directions of the
//!   duplex connection (`{type, payload}` envelope)

#![deny(unsafe_code)]

pub mod errors;
pub mod frames;
pub mod ids;
pub mod model;

pub use errors::ChatError;
pub use frames::{AgentInfo, ClientFrame, ServerFrame, TopicSummary};
pub use ids::{AgentId, ClientId, MessageId, TaskResultId, TopicId};
pub use model::{Message, Sender, Session, TaskResult, Topic};
