//! Wire protocol frames.
//!
//! One frame is one JSON message over the duplex connection, with the
//! envelope `{"type": ..., "payload": ...}`. Both directions are closed
//! tagged unions decoded at the boundary; anything that fails to decode
//! is a protocol error, answered with an `error` frame and ignored.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ClientId, MessageId, TopicId};
use crate::model::{Message, TaskResult};

/// One catalog entry as presented to clients in `initial_state`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Catalog ID.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Short description of what the agent does.
    pub description: String,
}

/// Summary row in `topic_list_update`.
///
/// `name` is the resolved display name: the stored name when present,
/// otherwise `"Chat {n}"` from the topic's 1-based list position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    /// Topic ID.
    pub id: TopicId,
    /// Agent the topic is bound to.
    pub agent_id: AgentId,
    /// Resolved display name.
    pub name: String,
}

/// Server → client frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once after a successful connect, before anything else.
    InitialState {
        /// The connecting client's ID, echoed back.
        client_id: ClientId,
        /// The full agent catalog.
        agents: Vec<AgentInfo>,
        /// Resolved active topic, if any.
        active_topic_id: Option<TopicId>,
    },
    /// The client's current topic list (may be empty).
    TopicListUpdate(Vec<TopicSummary>),
    /// Full message/result history for one topic.
    TopicState {
        /// Topic the state belongs to.
        topic_id: TopicId,
        /// Agent the topic is bound to.
        agent_id: AgentId,
        /// Conversation log, in append order.
        messages: Vec<Message>,
        /// Background task results, in append order.
        task_results: Vec<TaskResult>,
    },
    /// One newly appended message.
    NewMessage(Message),
    /// One newly appended background task result.
    NewTaskResult(TaskResult),
    /// One partial piece of a streamed agent reply.
    AgentMessageChunk {
        /// Topic the stream belongs to.
        topic_id: TopicId,
        /// ID the final assembled message will carry.
        message_id: MessageId,
        /// The chunk text.
        content_chunk: String,
        /// Whether this is the first chunk of the stream.
        is_first_chunk: bool,
    },
    /// Terminal marker for a streamed agent reply.
    AgentStreamEnd {
        /// Topic the stream belonged to.
        topic_id: TopicId,
        /// The streamed message's ID.
        message_id: MessageId,
    },
    /// Tells the client which topic is now active (can be none).
    ActiveTopicUpdate {
        /// The newly active topic, if any.
        topic_id: Option<TopicId>,
    },
    /// A recoverable error surfaced to the offending client.
    Error {
        /// Human-readable description.
        detail: String,
    },
    /// Keepalive reply to a client `ping`.
    Pong,
}

impl ServerFrame {
    /// Build an `error` frame from any detail string.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }
}

/// Client → server frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A chat message from the user.
    SendMessage {
        /// Message body.
        content: String,
        /// Agent selected in the UI when the message was sent.
        current_agent_id: AgentId,
        /// Target topic; absent means "start a new topic".
        #[serde(default)]
        topic_id: Option<TopicId>,
    },
    /// Switch the active topic to view another conversation.
    SelectTopic {
        /// Topic the client wants to activate.
        topic_id: TopicId,
    },
    /// Client-initiated keepalive.
    Ping,
}

impl ClientFrame {
    /// Wire name of the frame type, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::SelectTopic { .. } => "select_topic",
            Self::Ping => "ping",
        }
    }
}
