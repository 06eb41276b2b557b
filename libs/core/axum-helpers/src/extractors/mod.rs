//! Custom extractors for Axum handlers.

pub mod user_context;
pub mod validated_json;

pub use user_context::{USER_ID_HEADER, UserContext};
pub use validated_json::ValidatedJson;
