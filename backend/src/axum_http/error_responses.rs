use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use application::usecases::{
    enrollment_payments::PaymentError, notifications::NotificationError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A failure whose message is safe to show, e.g. the gateway's own text.
    #[error("{0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unauthenticated => AppError::Unauthorized(err.to_string()),
            PaymentError::Validation(message) => AppError::BadRequest(message),
            PaymentError::AlreadyEnrolled | PaymentError::AllCoursesOwned => {
                AppError::BadRequest(err.to_string())
            }
            PaymentError::CourseNotFound
            | PaymentError::EnrollmentNotFound
            | PaymentError::ReferenceUnknown => AppError::NotFound(err.to_string()),
            PaymentError::Gateway(message) => AppError::Upstream(message),
            PaymentError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound => AppError::NotFound(err.to_string()),
            NotificationError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(_) => {
                // Don't leak internal error detail to client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            error,
        });

        (status, body).into_response()
    }
}
