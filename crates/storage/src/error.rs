use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// An id prefix matched more than one record.
    #[error("ambiguous id prefix '{prefix}' matches {count} records")]
    Ambiguous { prefix: String, count: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
