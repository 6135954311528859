use thiserror::Error;

/// Error taxonomy for the merge pipeline.
///
/// Each variant carries a distinct recovery policy (see `spec.md` §7):
/// transient provider errors retry at the call edge, malformed responses
/// fail the group without retry, and batch-fatal errors abort the run.
#[derive(Error, Debug)]
pub enum EchomanError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transient provider error ({provider}): {message}")]
    Transient { provider: String, message: String },

    #[error("malformed LLM response: {0}")]
    MalformedLlmResponse(String),

    #[error("group handler failed: {0}")]
    GroupHandlerFailed(String),

    #[error("batch-wide fatal error: {0}")]
    BatchFatal(String),

    #[error("vector index drift: {0}")]
    VectorDrift(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EchomanError>;
