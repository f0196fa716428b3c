//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If `~/.parley/settings.json` exists, deep-merge user values over
//!    defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::Settings;

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, &|name| std::env::var(name).ok());
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// `lookup` abstracts `std::env::var` so tests can inject values.
/// Integers must parse and fall inside their range; invalid values are
/// silently ignored (the file/default value wins).
pub fn apply_env_overrides(settings: &mut Settings, lookup: &dyn Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PARLEY_HOST") {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            settings.server.host = trimmed.to_string();
        }
    }
    if let Some(v) = read_u64(lookup, "PARLEY_PORT", 1, 65535) {
        #[allow(clippy::cast_possible_truncation)]
        {
            settings.server.port = v as u16;
        }
    }
    if let Some(v) = read_u64(lookup, "PARLEY_SESSION_TIMEOUT_MINS", 1, 24 * 60) {
        settings.chat.session_timeout_mins = v;
    }
    if let Some(v) = read_u64(lookup, "PARLEY_REAPER_INTERVAL_SECS", 1, 3600) {
        settings.chat.reaper_interval_secs = v;
    }
    if let Some(v) = read_u64(lookup, "PARLEY_OUTBOUND_QUEUE", 1, 1_000_000) {
        #[allow(clippy::cast_possible_truncation)]
        {
            settings.server.outbound_queue = v as usize;
        }
    }
}

fn read_u64(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let raw = lookup(name)?;
    let parsed = raw.trim().parse::<u64>().ok()?;
    (min..=max).contains(&parsed).then_some(parsed)
}
