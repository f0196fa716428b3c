//! # parley-settings
//!
//! Settings loading for the relay: compiled defaults, optional JSON file
//! deep-merged over them, then environment variable overrides with
//! strict parsing.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{ChatSettings, ServerSettings, Settings};
