//! Error types for Tourline conversations

use thiserror::Error;

/// Errors surfaced by conversation, support and notification operations.
///
/// Every variant maps to a stable machine code that is sent to clients in
/// error events and HTTP error bodies.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Support conversation is closed")]
    TicketClosed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Notification broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Stable code sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AUTH_ERROR",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::TicketClosed => "TICKET_CLOSED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
            Self::Store(_) => "SERVER_ERROR",
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Store failures are collapsed into a generic message; the detail stays in logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Persistence-layer failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type ChatResult<T> = Result<T, ChatError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_hide_details() {
        let err: ChatError = StoreError::Corrupt("bad enum 'x'".to_string()).into();
        assert_eq!(err.code(), "SERVER_ERROR");
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_codes_are_distinct_per_category() {
        assert_eq!(ChatError::access_denied("nope").code(), "ACCESS_DENIED");
        assert_eq!(ChatError::validation("empty").code(), "VALIDATION_ERROR");
        assert_eq!(ChatError::TicketClosed.code(), "TICKET_CLOSED");
        assert!(ChatError::invalid_state("closed")
            .client_message()
            .contains("closed"));
    }
}
