//! Runtime configuration derived from settings.

use std::ops::RangeInclusive;
use std::time::Duration;

use parley_settings::{ChatSettings, ServerSettings};

/// Transport-level server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Outbound per-connection frame queue capacity.
    pub outbound_queue: usize,
}

impl ServerConfig {
    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            outbound_queue: settings.outbound_queue,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            outbound_queue: 1024,
        }
    }
}

/// Session lifecycle and streaming policy.
///
/// The ranges are inclusive randomization bounds. They shape pacing
/// only; nothing downstream may depend on exact values.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Idle timeout after which the reaper evicts a session.
    pub session_timeout: Duration,
    /// Reaper sweep interval.
    pub reaper_interval: Duration,
    /// Reaper pause after an unexpected sweep error.
    pub reaper_error_backoff: Duration,
    /// Whitespace tokens per streamed chunk.
    pub chunk_words: RangeInclusive<usize>,
    /// Inter-chunk pause, milliseconds.
    pub chunk_delay_ms: RangeInclusive<u64>,
    /// "Thinking" delay before the first chunk, milliseconds.
    pub initial_delay_ms: RangeInclusive<u64>,
    /// Background task delay, milliseconds.
    pub task_delay_ms: RangeInclusive<u64>,
}

/// Clamp a min/max pair into a non-empty inclusive range. An inverted
/// pair collapses to the single value `min`; sampling an empty
/// `RangeInclusive` panics, so one must never escape this module.
fn ordered<T: Ord + Copy>(min: T, max: T) -> RangeInclusive<T> {
    min..=max.max(min)
}

impl ChatConfig {
    /// Build from loaded settings. Inverted min/max pairs in the
    /// settings file are clamped, not rejected.
    #[must_use]
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self {
            session_timeout: Duration::from_secs(settings.session_timeout_mins * 60),
            reaper_interval: Duration::from_secs(settings.reaper_interval_secs),
            reaper_error_backoff: Duration::from_secs(settings.reaper_error_backoff_secs),
            chunk_words: ordered(settings.chunk_words_min, settings.chunk_words_max),
            chunk_delay_ms: ordered(settings.chunk_delay_ms_min, settings.chunk_delay_ms_max),
            initial_delay_ms: ordered(settings.initial_delay_ms_min, settings.initial_delay_ms_max),
            task_delay_ms: ordered(settings.task_delay_ms_min, settings.task_delay_ms_max),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_settings(&ChatSettings::default())
    }
}
