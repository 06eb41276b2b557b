use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, ErrorCode};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Photo not found: {0}")]
    NotFound(Uuid),

    #[error("Embedding generator unavailable: {0}")]
    GeneratorUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    Generation(String),

    #[error("Expected a vector of length {expected}, got {actual}")]
    MalformedVector { expected: usize, actual: usize },

    #[error("Vector component {index} is not a finite number")]
    NonFiniteVector { index: usize },

    #[error("Embedding generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Embedding store error: {0}")]
    Store(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        EmbeddingError::Generation(err.to_string())
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddingError::Internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(err: std::io::Error) -> Self {
        EmbeddingError::Internal(format!("I/O error: {}", err))
    }
}

/// Convert EmbeddingError to AppError for standardized HTTP error responses
impl From<EmbeddingError> for AppError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Validation(msg) => AppError::BadRequest(msg),
            EmbeddingError::NotFound(id) => AppError::NotFound(format!("Photo {} not found", id)),
            EmbeddingError::GeneratorUnavailable(msg) => AppError::coded(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::GeneratorUnavailable,
                msg,
            ),
            err @ (EmbeddingError::Generation(_)
            | EmbeddingError::MalformedVector { .. }
            | EmbeddingError::NonFiniteVector { .. }
            | EmbeddingError::Timeout(_)) => AppError::coded(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::EmbeddingGeneration,
                err.to_string(),
            ),
            EmbeddingError::Store(msg) => AppError::coded(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::EmbeddingStore,
                msg,
            ),
            EmbeddingError::Cancelled => AppError::InternalServerError("Batch cancelled".into()),
            EmbeddingError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for EmbeddingError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EmbeddingError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (EmbeddingError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                EmbeddingError::GeneratorUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EmbeddingError::MalformedVector {
                    expected: 4,
                    actual: 3,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (EmbeddingError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (EmbeddingError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
