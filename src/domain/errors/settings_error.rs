//! Settings storage error types.

use thiserror::Error;

/// Settings storage error variants.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    ReadFailed(String),

    #[error("failed to write settings: {0}")]
    WriteFailed(String),

    #[error("malformed settings: {0}")]
    Malformed(String),

    #[error("settings storage not available: {0}")]
    NotAvailable(String),
}
