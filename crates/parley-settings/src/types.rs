//! Settings schema and compiled defaults.

use serde::{Deserialize, Serialize};

/// Top-level settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Chat lifecycle and streaming policy.
    pub chat: ChatSettings,
}

/// Bind address and transport limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Outbound per-connection frame queue capacity.
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            outbound_queue: 1024,
        }
    }
}

/// Session lifecycle and streaming policy knobs.
///
/// The `*_min`/`*_max` pairs are inclusive randomization bounds; they
/// are policy, not correctness; nothing may assume exact values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Idle timeout after which the reaper evicts a session.
    pub session_timeout_mins: u64,
    /// Reaper sweep interval in seconds.
    pub reaper_interval_secs: u64,
    /// Reaper pause after an unexpected sweep error, in seconds.
    pub reaper_error_backoff_secs: u64,
    /// Minimum whitespace tokens per streamed chunk.
    pub chunk_words_min: usize,
    /// Maximum whitespace tokens per streamed chunk.
    pub chunk_words_max: usize,
    /// Minimum inter-chunk pause in milliseconds.
    pub chunk_delay_ms_min: u64,
    /// Maximum inter-chunk pause in milliseconds.
    pub chunk_delay_ms_max: u64,
    /// Minimum "thinking" delay before the first chunk, in milliseconds.
    pub initial_delay_ms_min: u64,
    /// Maximum "thinking" delay before the first chunk, in milliseconds.
    pub initial_delay_ms_max: u64,
    /// Minimum background task delay in milliseconds.
    pub task_delay_ms_min: u64,
    /// Maximum background task delay in milliseconds.
    pub task_delay_ms_max: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            session_timeout_mins: 30,
            reaper_interval_secs: 60,
            reaper_error_backoff_secs: 300,
            chunk_words_min: 2,
            chunk_words_max: 5,
            chunk_delay_ms_min: 100,
            chunk_delay_ms_max: 400,
            initial_delay_ms_min: 500,
            initial_delay_ms_max: 1500,
            task_delay_ms_min: 2000,
            task_delay_ms_max: 5000,
        }
    }
}
