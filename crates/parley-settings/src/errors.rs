//! Settings loading errors.

use thiserror::Error;

/// Failures while loading or parsing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file or merged value is not valid for the schema.
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, SettingsError>;
