//! Surface error types.

use policy::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A package definition is not valid JSON for its shape.
    #[error("failed to parse package: {0}")]
    Parse(#[from] serde_json::Error),

    /// A package definition parsed but failed validation.
    #[error("invalid package: {0}")]
    Validation(#[from] ValidationError),

    /// The requested package is not registered.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
