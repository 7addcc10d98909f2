use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use focusrank_shared::protocol::ErrorBody;
use focusrank_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Message rejected")]
    Rejected { reason: String },

    #[error("Slow down: too many messages")]
    RateLimited,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error, reason) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string(), None),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string(), None),
            ServerError::Rejected { reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                self.to_string(),
                Some(reason.clone()),
            ),
            ServerError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string(), None),
            ServerError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string(), None)
            }
            ServerError::Store(e) => {
                tracing::error!(error = %e, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    None,
                )
            }
            ServerError::Internal(e) => {
                tracing::error!(error = %e, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (status, axum::Json(ErrorBody { error, reason })).into_response()
    }
}
