use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum TokenQueueError {
    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("This appointment has no token")]
    MissingToken,

    #[error("Cannot complete a cancelled appointment")]
    AppointmentCancelled,

    #[error("Payment not completed")]
    PaymentNotCompleted,

    #[error("Invalid appointment status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("Invalid token code: {0}")]
    InvalidToken(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl TokenQueueError {
    /// Caller mistakes that must not be retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TokenQueueError::MissingToken
                | TokenQueueError::AppointmentCancelled
                | TokenQueueError::PaymentNotCompleted
                | TokenQueueError::InvalidStatusTransition { .. }
                | TokenQueueError::InvalidDate(_)
                | TokenQueueError::InvalidToken(_)
                | TokenQueueError::ValidationError(_)
        )
    }
}

impl From<TokenQueueError> for AppError {
    fn from(err: TokenQueueError) -> Self {
        match err {
            TokenQueueError::AppointmentNotFound(_) => AppError::NotFound("Appointment not found".to_string()),
            TokenQueueError::TokenNotFound(_) => AppError::NotFound("Token not found".to_string()),
            TokenQueueError::Forbidden(msg) => AppError::Forbidden(msg),
            TokenQueueError::RedisError(e) => {
                tracing::error!("Token counter store unavailable: {}", e);
                AppError::Internal("Token counter store unavailable".to_string())
            }
            TokenQueueError::ValidationError(msg) => AppError::ValidationError(msg),
            TokenQueueError::Conflict(msg) => AppError::Conflict(msg),
            TokenQueueError::StoreError(msg) => AppError::ExternalService(msg),
            TokenQueueError::SerializationError(e) => AppError::Internal(e.to_string()),
            precondition => AppError::BadRequest(precondition.to_string()),
        }
    }
}
