use thiserror::Error;
use uuid::Uuid;

/// Terminal outcomes for a brokered embedding request.
///
/// `Timeout` and `WorkerFailure` are retryable by the caller; `BrokerClosed`
/// means shutdown has begun and no retry against this broker instance will
/// succeed; `Cancelled` is not an error worth logging loudly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbedError {
    #[error("broker closed, shutdown in progress")]
    BrokerClosed,

    #[error("request timeout")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("worker failure: {0}")]
    WorkerFailure(String),
}

/// Failure reported by an [`EmbeddingStrategy`](crate::EmbeddingStrategy).
///
/// Always converted to a failure response at the worker boundary; it never
/// propagates as a transport error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised by the document pipeline built on top of the broker.
#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("text extraction failed: {0}")]
    Extract(String),

    #[error("summarization failed: {0}")]
    Summarize(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("article not found: {0}")]
    NotFound(Uuid),

    #[error("store error: {0}")]
    Store(String),
}
