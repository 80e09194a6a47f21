//! Policy error types.

use crate::validate::ValidationError;
use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A document failed structural validation.
    #[error("invalid policy: {0}")]
    Validation(#[from] ValidationError),

    /// Another writer replaced the active document first.
    #[error("policy changed concurrently (expected version {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },

    /// A writer panicked while holding the store lock.
    #[error("policy store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
