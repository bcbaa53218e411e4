use thiserror::Error;

/// Outcome classes of the conversation store.
///
/// Everything except `Internal` is a domain condition the caller can act on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("user is not part of this conversation")]
    Forbidden,

    #[error("conversation already exists")]
    Conflict,

    #[error("{0}")]
    PolicyViolation(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("storage failure: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(e.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
