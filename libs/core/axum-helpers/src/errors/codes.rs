//! Error codes shared by every Atlas API response.
//!
//! Each code carries a client-facing identifier, an integer for logs and
//! dashboards, and a default message.
//!
//! ```rust
//! use axum_helpers::errors::ErrorCode;
//!
//! let code = ErrorCode::GeneratorUnavailable;
//! assert_eq!(code.as_str(), "GENERATOR_UNAVAILABLE");
//! assert_eq!(code.code(), 3001);
//! ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (1000-1999)
    /// Request validation failed
    ValidationError,

    /// Invalid UUID format in a path, query or header value
    InvalidUuid,

    /// Request body is not valid JSON for the endpoint
    JsonExtraction,

    /// Requested resource was not found
    NotFound,

    /// Caller identity is missing or malformed
    Unauthorized,

    /// Request conflicts with current resource state
    Conflict,

    // Server errors (2000-2999)
    /// An unexpected internal server error occurred
    InternalError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// File system I/O error
    IoError,

    /// JSON serialization error
    SerdeJsonError,

    // Embedding pipeline errors (3000-3999)
    /// No embedding generator is configured
    GeneratorUnavailable,

    /// The embedding generator failed or returned an unusable vector
    EmbeddingGeneration,

    /// The embedding store rejected a read or write
    EmbeddingStore,
}

impl ErrorCode {
    /// Client-facing SCREAMING_SNAKE_CASE identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidUuid => "INVALID_UUID",
            Self::JsonExtraction => "JSON_EXTRACTION",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Conflict => "CONFLICT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::IoError => "IO_ERROR",
            Self::SerdeJsonError => "SERDE_JSON_ERROR",
            Self::GeneratorUnavailable => "GENERATOR_UNAVAILABLE",
            Self::EmbeddingGeneration => "EMBEDDING_GENERATION",
            Self::EmbeddingStore => "EMBEDDING_STORE",
        }
    }

    /// Integer code used in structured logs.
    ///
    /// - 1000-1999: client errors
    /// - 2000-2999: server errors
    /// - 3000-3999: embedding pipeline errors
    pub fn code(&self) -> i32 {
        match self {
            Self::ValidationError => 1001,
            Self::InvalidUuid => 1002,
            Self::JsonExtraction => 1003,
            Self::NotFound => 1004,
            Self::Unauthorized => 1005,
            Self::Conflict => 1006,

            Self::InternalError => 2001,
            Self::ServiceUnavailable => 2002,
            Self::IoError => 2003,
            Self::SerdeJsonError => 2004,

            Self::GeneratorUnavailable => 3001,
            Self::EmbeddingGeneration => 3002,
            Self::EmbeddingStore => 3003,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "Request validation failed",
            Self::InvalidUuid => "Invalid UUID format",
            Self::JsonExtraction => "Failed to parse request body",
            Self::NotFound => "Resource not found",
            Self::Unauthorized => "Authentication required",
            Self::Conflict => "Resource already exists",
            Self::InternalError => "An internal server error occurred",
            Self::ServiceUnavailable => "Service is temporarily unavailable",
            Self::IoError => "I/O error occurred",
            Self::SerdeJsonError => "JSON serialization error",
            Self::GeneratorUnavailable => "Embedding generator is not configured",
            Self::EmbeddingGeneration => "Embedding generation failed",
            Self::EmbeddingStore => "Embedding storage failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_string_representation() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::NotFound.as_str(), "NOT_FOUND");
        assert_eq!(
            ErrorCode::GeneratorUnavailable.as_str(),
            "GENERATOR_UNAVAILABLE"
        );
    }

    #[test]
    fn test_error_code_integer_ranges() {
        assert_eq!(ErrorCode::ValidationError.code(), 1001);
        assert_eq!(ErrorCode::InternalError.code(), 2001);
        assert_eq!(ErrorCode::EmbeddingStore.code(), 3003);
    }

    #[test]
    fn test_error_code_display_matches_serde() {
        let code = ErrorCode::EmbeddingGeneration;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, format!("\"{}\"", code));

        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
