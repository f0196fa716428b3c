//! Message pipeline: turns one inbound user message into its full set
//! of outbound effects.
//!
//! For each accepted message the pipeline appends the user message,
//! echoes it back, streams the agent reply as simulated token chunks,
//! persists the assembled reply, and launches a detached background
//! task whose result arrives later. Every step is independently
//! fallible; validation failures surface as `error` frames and mutate
//! nothing.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use parley_agents::{AgentCatalog, ReplyBackend};
use parley_core::errors::ChatError;
use parley_core::frames::ServerFrame;
use parley_core::ids::{AgentId, ClientId, MessageId, TopicId};
use rand::Rng;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::config::ChatConfig;
use crate::store::SessionStore;
use crate::websocket::registry::ConnectionRegistry;

/// Split `text` into whitespace-token runs of randomized length.
///
/// Each chunk carries a trailing space so the client can concatenate
/// chunks verbatim. Empty input yields no chunks.
fn chunk_text<R: Rng>(
    text: &str,
    words_per_chunk: &RangeInclusive<usize>,
    rng: &mut R,
) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    // Sampling an empty range panics; an inverted pair collapses to min.
    let lo = *words_per_chunk.start();
    let hi = (*words_per_chunk.end()).max(lo);
    while start < words.len() {
        let take = rng.random_range(lo..=hi).max(1);
        let end = (start + take).min(words.len());
        let mut chunk = String::new();
        for word in &words[start..end] {
            chunk.push_str(word);
            chunk.push(' ');
        }
        chunks.push(chunk);
        start = end;
    }
    chunks
}

fn sample_ms(range: &RangeInclusive<u64>) -> Duration {
    let lo = *range.start();
    let hi = (*range.end()).max(lo);
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// Shared services behind every inbound frame.
pub struct MessagePipeline {
    store: Arc<SessionStore>,
    registry: Arc<ConnectionRegistry>,
    catalog: Arc<AgentCatalog>,
    backend: Arc<dyn ReplyBackend>,
    config: ChatConfig,
    tasks: TaskTracker,
}

impl MessagePipeline {
    /// Wire the pipeline to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<ConnectionRegistry>,
        catalog: Arc<AgentCatalog>,
        backend: Arc<dyn ReplyBackend>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            backend,
            config,
            tasks: TaskTracker::new(),
        }
    }

    /// Stop accepting new background tasks and drain the in-flight ones.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn send_error(&self, client_id: &ClientId, err: &ChatError) {
        warn!(%client_id, error = %err, "reporting error to client");
        let _ = self
            .registry
            .send(client_id, ServerFrame::error(err.detail()))
            .await;
    }

    /// Push the client's current topic list.
    pub async fn send_topic_list(&self, client_id: &ClientId) {
        let summaries = self.store.list_topics(client_id);
        let _ = self
            .registry
            .send(client_id, ServerFrame::TopicListUpdate(summaries))
            .await;
    }

    /// Push the full message/result history of an owned topic.
    pub async fn send_topic_state(
        &self,
        client_id: &ClientId,
        topic_id: &TopicId,
    ) -> Result<(), ChatError> {
        let topic = self.store.topic_snapshot(client_id, topic_id)?;
        let _ = self
            .registry
            .send(
                client_id,
                ServerFrame::TopicState {
                    topic_id: topic.id,
                    agent_id: topic.agent_id,
                    messages: topic.messages,
                    task_results: topic.task_results,
                },
            )
            .await;
        Ok(())
    }

    /// Tell the client which topic is now active (possibly none).
    pub async fn send_active_topic(&self, client_id: &ClientId, topic_id: Option<TopicId>) {
        let _ = self
            .registry
            .send(client_id, ServerFrame::ActiveTopicUpdate { topic_id })
            .await;
    }

    /// Dispatch a `send_message` frame.
    ///
    /// No `topic_id` starts a new topic with `current_agent_id`. A
    /// `topic_id` bound to a different agent is an agent switch and
    /// also starts a new topic; the old topic is never mutated.
    /// Existence and ownership of a provided `topic_id` are validated
    /// before anything else.
    #[instrument(skip_all, fields(client_id = %client_id))]
    pub async fn handle_send_message(
        &self,
        client_id: &ClientId,
        content: &str,
        current_agent_id: &AgentId,
        topic_id: Option<TopicId>,
    ) {
        self.store.touch(client_id);
        if content.trim().is_empty() {
            warn!(%client_id, "ignoring send_message with empty content");
            return;
        }

        let Some(topic_id) = topic_id else {
            info!(%client_id, agent_id = %current_agent_id, "first message in new topic flow");
            self.start_topic(client_id, current_agent_id, content).await;
            return;
        };

        if let Err(err) = self.store.validate_owned(client_id, &topic_id) {
            self.send_error(client_id, &err).await;
            return;
        }

        match self.store.topic_agent(&topic_id) {
            Some(agent_id) if agent_id != *current_agent_id => {
                info!(
                    %client_id, old_topic_id = %topic_id, agent_id = %current_agent_id,
                    "agent changed mid-topic, starting fresh topic"
                );
                self.start_topic(client_id, current_agent_id, content).await;
            }
            Some(_) => self.process_message(client_id, &topic_id, content).await,
            None => {
                // Lost a race with the reaper between validation and lookup.
                self.send_error(
                    client_id,
                    &ChatError::TopicNotFound {
                        topic_id: topic_id.clone(),
                    },
                )
                .await;
            }
        }
    }

    /// Dispatch a `select_topic` frame: validate, make active, resend
    /// the topic's history, confirm the active topic.
    #[instrument(skip_all, fields(client_id = %client_id, topic_id = %topic_id))]
    pub async fn handle_select_topic(&self, client_id: &ClientId, topic_id: &TopicId) {
        self.store.touch(client_id);
        if let Err(err) = self.store.select_topic(client_id, topic_id) {
            self.send_error(client_id, &err).await;
            return;
        }
        if let Err(err) = self.send_topic_state(client_id, topic_id).await {
            self.send_error(client_id, &err).await;
            return;
        }
        self.send_active_topic(client_id, Some(topic_id.clone()))
            .await;
    }

    /// Create a topic for `agent_id` and run `content` through it as its
    /// first message.
    async fn start_topic(&self, client_id: &ClientId, agent_id: &AgentId, content: &str) {
        let topic = match self.store.create_topic(client_id, agent_id) {
            Ok(topic) => topic,
            Err(err) => {
                self.send_error(client_id, &err).await;
                return;
            }
        };
        self.send_topic_list(client_id).await;
        self.process_message(client_id, &topic.id, content).await;
        self.send_active_topic(client_id, Some(topic.id)).await;
    }

    /// Append the user message, echo it, stream the reply, and launch
    /// the background task.
    async fn process_message(&self, client_id: &ClientId, topic_id: &TopicId, content: &str) {
        let message = match self.store.append_user_message(client_id, topic_id, content) {
            Ok(message) => message,
            Err(err) => {
                self.send_error(client_id, &err).await;
                return;
            }
        };
        debug!(%client_id, %topic_id, message_id = %message.id, "appended user message");
        let _ = self
            .registry
            .send(client_id, ServerFrame::NewMessage(message))
            .await;

        self.stream_agent_reply(client_id, topic_id, content).await;
        self.spawn_background_task(client_id, topic_id, content);
    }

    /// Generate the agent reply and emit it as a chunk stream, then
    /// persist the assembled message under the stream's ID.
    async fn stream_agent_reply(&self, client_id: &ClientId, topic_id: &TopicId, prompt: &str) {
        let Some(agent_id) = self.store.topic_agent(topic_id) else {
            warn!(%topic_id, "topic vanished before agent reply");
            return;
        };
        let Some(agent) = self.catalog.get(&agent_id).cloned() else {
            warn!(%agent_id, "topic bound to unknown agent, skipping reply");
            return;
        };

        // Simulated thinking time before the first token.
        sleep(sample_ms(&self.config.initial_delay_ms)).await;

        let reply = match self.backend.generate(&agent, prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%client_id, %topic_id, error = %err, "reply backend failed");
                let _ = self
                    .registry
                    .send(client_id, ServerFrame::error("Agent failed to respond."))
                    .await;
                return;
            }
        };

        let message_id = MessageId::new();
        let chunks = chunk_text(&reply, &self.config.chunk_words, &mut rand::rng());
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let _ = self
                .registry
                .send(
                    client_id,
                    ServerFrame::AgentMessageChunk {
                        topic_id: topic_id.clone(),
                        message_id: message_id.clone(),
                        content_chunk: chunk,
                        is_first_chunk: i == 0,
                    },
                )
                .await;
            if i < last {
                sleep(sample_ms(&self.config.chunk_delay_ms)).await;
            }
        }
        let _ = self
            .registry
            .send(
                client_id,
                ServerFrame::AgentStreamEnd {
                    topic_id: topic_id.clone(),
                    message_id: message_id.clone(),
                },
            )
            .await;

        // Chunks are transient; only the assembled reply is persisted.
        if let Err(err) =
            self.store
                .append_agent_message(client_id, topic_id, message_id, &reply)
        {
            warn!(%client_id, %topic_id, error = %err, "agent reply arrived for torn-down topic");
        }
    }

    /// Fire-and-forget background computation tied to one user message.
    ///
    /// The task captures `(client_id, topic_id)` and re-validates both
    /// after its delay; a stale result is dropped, never queued.
    fn spawn_background_task(&self, client_id: &ClientId, topic_id: &TopicId, input: &str) {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let client_id = client_id.clone();
        let topic_id = topic_id.clone();
        let snippet: String = input.chars().take(20).collect();
        let delay = sample_ms(&self.config.task_delay_ms);

        debug!(%client_id, %topic_id, ?delay, "launching background task");
        drop(self.tasks.spawn(async move {
            sleep(delay).await;

            if !store.session_topic_valid(&client_id, &topic_id) {
                warn!(%client_id, %topic_id, "dropping task result for torn-down session/topic");
                return;
            }
            let content = format!("Task '{snippet}...' completed successfully.");
            match store.append_task_result(&client_id, &topic_id, &content) {
                Ok(result) => {
                    let _ = registry
                        .send(&client_id, ServerFrame::NewTaskResult(result))
                        .await;
                }
                Err(err) => {
                    warn!(%client_id, %topic_id, error = %err, "failed to append task result");
                }
            }
        }));
    }
}
