//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourline_shared::{ChatError, StoreError};

/// Error returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Chat(err) => match err {
                ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
                ChatError::AccessDenied(_) => StatusCode::FORBIDDEN,
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::InvalidState(_) | ChatError::TicketClosed => StatusCode::CONFLICT,
                ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                ChatError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::Chat(err) => {
                if let ChatError::Store(store_err) = err {
                    tracing::error!(error = ?store_err, "Store failure while handling request");
                }
                (err.code(), err.client_message())
            }
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Chat(ChatError::Store(err))
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
