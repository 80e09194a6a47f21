//! Studio error types.
//!
//! Expected validation failures never surface here; they come back as
//! [`crate::PublishOutcome::Rejected`]. An `Error` means the host environment
//! failed and the commit was not confirmed.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error("audit storage error: {0}")]
    Storage(#[from] storage::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The manifest registry changed under a compare-and-swap.
    #[error("manifest registry changed concurrently")]
    ManifestConflict,

    #[error("studio lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
