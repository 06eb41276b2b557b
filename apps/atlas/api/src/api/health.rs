//! Readiness checks for the embedding pipeline's collaborators.

use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_helpers::server::{HealthCheckFuture, run_health_checks};

/// Ready when an embedding generator is configured and the photo directory answers.
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![
        (
            "generator",
            Box::pin(async {
                if state.embeddings.is_generator_configured() {
                    Ok(())
                } else {
                    Err("EMBEDDING_API_URL is not set".to_string())
                }
            }),
        ),
        (
            "photo_directory",
            Box::pin(async {
                if state.embeddings.photo_directory_ready().await {
                    Ok(())
                } else {
                    Err("photo directory did not answer".to_string())
                }
            }),
        ),
    ];

    run_health_checks(checks).await.into_response()
}
