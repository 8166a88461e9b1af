use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unparsable text: {0}")]
    UnparsableText(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Unexpected failures are logged here and surfaced as a generic 500
        // so internals never leak into the response body.
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::InsufficientStock(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidState(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::UnparsableText(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::ExternalService(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::DbError(err) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::OrmError(err) => {
                tracing::error!(error = %err, "orm error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        (status, axum::Json(ApiResponse::failure(message))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
