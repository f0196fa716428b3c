//! In-memory domain model for sessions, topics, messages, and task
//! results.
//!
//! `Message` and `TaskResult` are immutable once appended; a topic's
//! sequences are append-only logs in conversation order. A topic is
//! bound to one client and one agent for its whole lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ClientId, MessageId, TaskResultId, TopicId};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human on the other end of the connection.
    User,
    /// The (simulated) agent reply.
    Agent,
    /// Server-generated notices.
    System,
}

/// A single message within a topic. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Owning topic.
    pub topic_id: TopicId,
    /// Author of the message.
    pub sender: Sender,
    /// Message body.
    pub content: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the current time.
    #[must_use]
    pub fn now(topic_id: TopicId, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            topic_id,
            sender,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of a detached background computation tied to one user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Result ID.
    pub id: TaskResultId,
    /// Owning topic.
    pub topic_id: TopicId,
    /// Result body.
    pub content: String,
    /// When the result was appended.
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// Build a task result stamped with the current time.
    #[must_use]
    pub fn now(topic_id: TopicId, content: impl Into<String>) -> Self {
        Self {
            id: TaskResultId::new(),
            topic_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One conversation thread, bound to one client and one agent.
///
/// Switching agents always produces a *new* topic; an existing topic's
/// `agent_id` never changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
    /// Topic ID.
    pub id: TopicId,
    /// Owning client.
    pub client_id: ClientId,
    /// Agent this topic is bound to.
    pub agent_id: AgentId,
    /// Optional user-facing name. Unnamed topics get a positional
    /// display name at read time.
    pub name: Option<String>,
    /// Append-only conversation log.
    pub messages: Vec<Message>,
    /// Append-only background task results.
    pub task_results: Vec<TaskResult>,
    /// Creation timestamp, used for ordering topic lists.
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create an empty topic owned by `client_id` and bound to `agent_id`.
    #[must_use]
    pub fn new(client_id: ClientId, agent_id: AgentId) -> Self {
        Self {
            id: TopicId::new(),
            client_id,
            agent_id,
            name: None,
            messages: Vec::new(),
            task_results: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Per-client session record: activity tracking plus the active topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Client this session belongs to.
    pub client_id: ClientId,
    /// Currently selected topic, if any. When set, always names a topic
    /// that exists and is owned by this client.
    pub active_topic_id: Option<TopicId>,
    /// Timestamp of the last inbound activity; drives idle eviction.
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session with no active topic.
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            active_topic_id: None,
            last_activity: Utc::now(),
        }
    }
}
