//! Error hierarchy for the relay core.
//!
//! Every variant corresponds to a validation failure that is surfaced to
//! the offending client as an `error{detail}` frame; nothing here is
//! fatal to the process.

use thiserror::Error;

use crate::ids::{AgentId, ClientId, TopicId};

/// Validation and lookup failures in the session/topic layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No session exists for the client.
    #[error("Session not found for client '{client_id}'")]
    SessionNotFound {
        /// Client whose session was missing.
        client_id: ClientId,
    },

    /// The topic does not exist.
    #[error("Chat topic {topic_id} not found.")]
    TopicNotFound {
        /// The missing topic.
        topic_id: TopicId,
    },

    /// The topic exists but belongs to a different client.
    #[error("Access denied to this chat topic.")]
    AccessDenied {
        /// The topic the client tried to touch.
        topic_id: TopicId,
    },

    /// The agent ID does not appear in the catalog.
    #[error("Agent '{agent_id}' not found.")]
    AgentNotFound {
        /// The unknown agent.
        agent_id: AgentId,
    },
}

impl ChatError {
    /// Client-facing detail string for `error` frames.
    #[must_use]
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
