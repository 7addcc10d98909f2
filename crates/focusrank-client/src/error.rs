use focusrank_shared::error::Rejection;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Message rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Slow down: too many messages")]
    RateLimited,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {error}")]
    Server {
        status: u16,
        error: String,
        reason: Option<String>,
    },

    #[error("No message with client key {0}")]
    UnknownMessage(Uuid),

    #[error("Message {0} has not failed")]
    NotFailed(Uuid),
}
