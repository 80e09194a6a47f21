//! CLI error types.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist.
    ///
    /// This typically means nothing has been published yet.
    #[error("database not found at {path}. Run 'modkit publish' first")]
    DatabaseNotFound { path: PathBuf },

    /// A document, bundle or argument failed validation.
    #[error("{0}")]
    Invalid(String),

    /// Preflight or commit rejected the bundle.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Configuration is invalid or could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error(transparent)]
    Surface(#[from] surface::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Studio(#[from] studio::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<policy::ValidationError> for Error {
    fn from(err: policy::ValidationError) -> Self {
        Self::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
