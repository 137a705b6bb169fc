use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Error kinds observable by the core, per the error handling design:
/// recover locally for cache/webhook failures, surface everything else
/// that reaches a public response path.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("short code space exhausted after {0} attempts")]
    DuplicateShortCode(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Targeting rejection is surfaced identically to NotFound — a 404 is
    /// returned rather than leaking a "not for you" signal to the caller.
    pub fn targeting_reject() -> Self {
        CoreError::NotFound
    }
}
