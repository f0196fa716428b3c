//! In-memory session/topic store.
//!
//! One `parking_lot::RwLock` guards both maps, so every mutation is
//! atomic with respect to lookups: no reader can observe a
//! half-updated session/topic pair. All methods are synchronous and
//! never hold the lock across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use parley_agents::AgentCatalog;
use parley_core::errors::ChatError;
use parley_core::frames::TopicSummary;
use parley_core::ids::{AgentId, ClientId, MessageId, TopicId};
use parley_core::model::{Message, Sender, Session, TaskResult, Topic};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Inner {
    sessions: HashMap<ClientId, Session>,
    topics: HashMap<TopicId, Topic>,
}

impl Inner {
    /// Topic IDs owned by `client_id`, creation order ascending.
    ///
    /// UUID v7 topic IDs break creation-timestamp ties, newest last.
    fn topics_for(&self, client_id: &ClientId) -> Vec<TopicId> {
        let mut owned: Vec<&Topic> = self
            .topics
            .values()
            .filter(|t| &t.client_id == client_id)
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        owned.into_iter().map(|t| t.id.clone()).collect()
    }

    fn owned_topic_mut(
        &mut self,
        client_id: &ClientId,
        topic_id: &TopicId,
    ) -> Result<&mut Topic, ChatError> {
        let topic = self
            .topics
            .get_mut(topic_id)
            .ok_or_else(|| ChatError::TopicNotFound {
                topic_id: topic_id.clone(),
            })?;
        if &topic.client_id != client_id {
            return Err(ChatError::AccessDenied {
                topic_id: topic_id.clone(),
            });
        }
        Ok(topic)
    }
}

/// Exclusive owner of all sessions and topics.
pub struct SessionStore {
    catalog: Arc<AgentCatalog>,
    inner: RwLock<Inner>,
}

impl SessionStore {
    /// Create an empty store validating agents against `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<AgentCatalog>) -> Self {
        Self {
            catalog,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Refresh the session's activity timestamp.
    ///
    /// Can race a reaper eviction, in which case there is nothing to
    /// refresh; that is logged, not an error.
    pub fn touch(&self, client_id: &ClientId) {
        let mut inner = self.inner.write();
        match inner.sessions.get_mut(client_id) {
            Some(session) => session.last_activity = Utc::now(),
            None => warn!(%client_id, "activity refresh for unknown session"),
        }
    }

    /// Handle a client connecting.
    ///
    /// Existing session: refresh activity, clear a dangling active topic
    /// ID, and fall back to the client's most recently created topic
    /// when no valid active topic remains. New session: create it with
    /// no active topic; topics are only ever created by the first user
    /// message.
    pub fn handle_connect(&self, client_id: &ClientId) -> Option<TopicId> {
        let mut inner = self.inner.write();

        if inner.sessions.contains_key(client_id) {
            debug!(%client_id, "reconnect for existing session");
            let mut active = inner
                .sessions
                .get(client_id)
                .and_then(|s| s.active_topic_id.clone());

            if let Some(ref topic_id) = active {
                if !inner.topics.contains_key(topic_id) {
                    warn!(%client_id, %topic_id, "active topic vanished, clearing");
                    active = None;
                }
            }
            if active.is_none() {
                active = inner.topics_for(client_id).pop();
                if let Some(ref topic_id) = active {
                    info!(%client_id, %topic_id, "restored active topic to latest");
                }
            }

            if let Some(session) = inner.sessions.get_mut(client_id) {
                session.active_topic_id = active.clone();
                session.last_activity = Utc::now();
            }
            active
        } else {
            info!(%client_id, "creating new session");
            let _ = inner
                .sessions
                .insert(client_id.clone(), Session::new(client_id.clone()));
            None
        }
    }

    /// Create a topic for `client_id` bound to `agent_id`, set it as the
    /// session's active topic, and refresh activity.
    ///
    /// This is also the sole mechanism for an agent switch: a topic's
    /// agent never changes, a fresh topic is created instead.
    pub fn create_topic(
        &self,
        client_id: &ClientId,
        agent_id: &AgentId,
    ) -> Result<Topic, ChatError> {
        if !self.catalog.contains(agent_id) {
            return Err(ChatError::AgentNotFound {
                agent_id: agent_id.clone(),
            });
        }
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| ChatError::SessionNotFound {
                client_id: client_id.clone(),
            })?;

        let topic = Topic::new(client_id.clone(), agent_id.clone());
        session.active_topic_id = Some(topic.id.clone());
        session.last_activity = Utc::now();
        let _ = inner.topics.insert(topic.id.clone(), topic.clone());
        info!(%client_id, %agent_id, topic_id = %topic.id, "created topic");
        Ok(topic)
    }

    /// Make `topic_id` the client's active topic after validating
    /// existence and ownership.
    pub fn select_topic(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
    ) -> Result<(), ChatError> {
        let mut inner = self.inner.write();
        let _ = inner.owned_topic_mut(client_id, topic_id)?;
        let session = inner
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| ChatError::SessionNotFound {
                client_id: client_id.clone(),
            })?;
        session.active_topic_id = Some(topic_id.clone());
        session.last_activity = Utc::now();
        Ok(())
    }

    /// Append the user's message to an owned topic.
    pub fn append_user_message(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
        content: &str,
    ) -> Result<Message, ChatError> {
        let mut inner = self.inner.write();
        let topic = inner.owned_topic_mut(client_id, topic_id)?;
        let message = Message::now(topic_id.clone(), Sender::User, content);
        topic.messages.push(message.clone());
        Ok(message)
    }

    /// Append the fully assembled agent reply under the stream's
    /// message ID. Chunks are never persisted.
    pub fn append_agent_message(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
        message_id: MessageId,
        content: &str,
    ) -> Result<Message, ChatError> {
        let mut inner = self.inner.write();
        let topic = inner.owned_topic_mut(client_id, topic_id)?;
        let message = Message {
            id: message_id,
            topic_id: topic_id.clone(),
            sender: Sender::Agent,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        topic.messages.push(message.clone());
        Ok(message)
    }

    /// Append a background task result to an owned topic.
    pub fn append_task_result(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
        content: &str,
    ) -> Result<TaskResult, ChatError> {
        let mut inner = self.inner.write();
        let topic = inner.owned_topic_mut(client_id, topic_id)?;
        let result = TaskResult::now(topic_id.clone(), content);
        topic.task_results.push(result.clone());
        Ok(result)
    }

    /// The topic's bound agent, if the topic exists.
    pub fn topic_agent(&self, topic_id: &TopicId) -> Option<AgentId> {
        self.inner
            .read()
            .topics
            .get(topic_id)
            .map(|t| t.agent_id.clone())
    }

    /// Validate that `topic_id` exists and is owned by `client_id`.
    pub fn validate_owned(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
    ) -> Result<(), ChatError> {
        let inner = self.inner.read();
        let topic = inner
            .topics
            .get(topic_id)
            .ok_or_else(|| ChatError::TopicNotFound {
                topic_id: topic_id.clone(),
            })?;
        if &topic.client_id != client_id {
            return Err(ChatError::AccessDenied {
                topic_id: topic_id.clone(),
            });
        }
        Ok(())
    }

    /// Whether both the session and the topic still exist and still
    /// match. Background tasks call this after their delay; a `false`
    /// answer means the result must be dropped.
    pub fn session_topic_valid(&self, client_id: &ClientId, topic_id: &TopicId) -> bool {
        let inner = self.inner.read();
        inner.sessions.contains_key(client_id)
            && inner
                .topics
                .get(topic_id)
                .is_some_and(|t| &t.client_id == client_id)
    }

    /// Topic summaries for the client, creation order ascending.
    ///
    /// Unnamed topics get a positional display name (`"Chat {n}"`,
    /// 1-based) computed here, never persisted.
    pub fn list_topics(&self, client_id: &ClientId) -> Vec<TopicSummary> {
        let inner = self.inner.read();
        inner
            .topics_for(client_id)
            .iter()
            .enumerate()
            .filter_map(|(i, topic_id)| {
                inner.topics.get(topic_id).map(|t| TopicSummary {
                    id: t.id.clone(),
                    agent_id: t.agent_id.clone(),
                    name: t.name.clone().unwrap_or_else(|| format!("Chat {}", i + 1)),
                })
            })
            .collect()
    }

    /// Full snapshot of an owned topic for `topic_state`.
    pub fn topic_snapshot(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
    ) -> Result<Topic, ChatError> {
        let inner = self.inner.read();
        let topic = inner
            .topics
            .get(topic_id)
            .ok_or_else(|| ChatError::TopicNotFound {
                topic_id: topic_id.clone(),
            })?;
        if &topic.client_id != client_id {
            return Err(ChatError::AccessDenied {
                topic_id: topic_id.clone(),
            });
        }
        Ok(topic.clone())
    }

    /// The client's current active topic, if any.
    pub fn active_topic(&self, client_id: &ClientId) -> Option<TopicId> {
        self.inner
            .read()
            .sessions
            .get(client_id)
            .and_then(|s| s.active_topic_id.clone())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Remove every session idle longer than `timeout`, along with all
    /// topics owned by it. Returns the evicted client IDs so the caller
    /// can close any lingering connections.
    pub fn reap_idle(&self, timeout: Duration) -> Vec<ClientId> {
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let now = Utc::now();
        let mut inner = self.inner.write();

        let idle: Vec<ClientId> = inner
            .sessions
            .iter()
            .filter(|(_, s)| now - s.last_activity > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for client_id in &idle {
            let owned = inner.topics_for(client_id);
            debug!(%client_id, topics = owned.len(), "evicting idle session");
            for topic_id in owned {
                let _ = inner.topics.remove(&topic_id);
            }
            let _ = inner.sessions.remove(client_id);
        }
        idle
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, client_id: &ClientId, by: Duration) {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(client_id) {
            session.last_activity -= chrono::Duration::from_std(by).unwrap();
        }
    }
}
