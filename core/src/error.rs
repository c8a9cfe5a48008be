use thiserror::Error;

/// Failure kinds surfaced by the service layer.
///
/// None of these are retried internally; callers decide whether to retry.
#[derive(Debug, Error)]
pub enum CookbookError {
    /// A recipe or ingredient id did not match anything in the collection.
    #[error("{0}")]
    NotFound(String),
    /// The request payload was well-formed JSON but violated a rule
    /// such as a blank name or an unknown unit.
    #[error("{0}")]
    Validation(String),
    /// The store accepted the write but reported that nothing was modified,
    /// or did not acknowledge it at all.
    #[error("{0}")]
    WriteFailed(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CookbookError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed(message.into())
    }
}
