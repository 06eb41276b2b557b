use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use axum_helpers::{
    UserContext, ValidatedJson,
    errors::responses::{
        BadRequestValidationResponse, InternalServerErrorResponse, ServiceUnavailableResponse,
        UnauthorizedResponse,
    },
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;
use utoipa::OpenApi;

use crate::batch::{BatchComplete, BatchProgress, BatchStart};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::{
    Dims, GenerateEmbeddingsRequest, GenerateEmbeddingsResponse, GeoPoint, PhotoMetadata,
    VisualizationPoint, VisualizationQuery, VisualizationResponse,
};
use crate::repository::{EmbeddingStore, PhotoDirectory};
use crate::service::EmbeddingService;

pub const TAG: &str = "photo-embeddings";

/// OpenAPI documentation for the photo embeddings API
#[derive(OpenApi)]
#[openapi(
    paths(get_visualization, generate_embeddings),
    components(
        schemas(
            VisualizationResponse,
            VisualizationPoint,
            PhotoMetadata,
            GeoPoint,
            GenerateEmbeddingsRequest,
            GenerateEmbeddingsResponse,
            BatchStart,
            BatchProgress,
            BatchComplete
        ),
        responses(
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ServiceUnavailableResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "Photo embedding visualization and batch generation")
    )
)]
pub struct ApiDoc;

/// Create the photo embeddings router
pub fn router<S, P>(service: EmbeddingService<S, P>) -> Router
where
    S: EmbeddingStore + 'static,
    P: PhotoDirectory + 'static,
{
    router_with_shared(Arc::new(service))
}

/// Same as [`router`] for a service the caller keeps a handle to
pub fn router_with_shared<S, P>(service: Arc<EmbeddingService<S, P>>) -> Router
where
    S: EmbeddingStore + 'static,
    P: PhotoDirectory + 'static,
{
    Router::new()
        .route(
            "/photos/embeddings",
            get(get_visualization).post(generate_embeddings),
        )
        .with_state(service)
}

/// Project and cluster the caller's embeddings
#[utoipa::path(
    get,
    path = "/photos/embeddings",
    tag = TAG,
    params(
        VisualizationQuery,
        ("x-user-id" = Uuid, Header, description = "Caller id")
    ),
    responses(
        (status = 200, description = "Plot points for every embedded photo", body = VisualizationResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_visualization<S, P>(
    State(service): State<Arc<EmbeddingService<S, P>>>,
    user: UserContext,
    query: Result<Query<VisualizationQuery>, QueryRejection>,
) -> EmbeddingResult<Json<VisualizationResponse>>
where
    S: EmbeddingStore + 'static,
    P: PhotoDirectory + 'static,
{
    let Query(query) =
        query.map_err(|rejection| EmbeddingError::Validation(rejection.body_text()))?;
    let dims = match query.dims {
        Some(raw) => Dims::try_from(raw).map_err(EmbeddingError::Validation)?,
        None => Dims::default(),
    };

    let response = service.visualize(user.user_id, dims).await?;
    Ok(Json(response))
}

/// Generate embeddings for the caller's photos
///
/// With `stream: true` the response is `text/event-stream` carrying `start`,
/// `progress` and `complete` events. Closing the connection stops the batch.
#[utoipa::path(
    post,
    path = "/photos/embeddings",
    tag = TAG,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller id")
    ),
    request_body = GenerateEmbeddingsRequest,
    responses(
        (status = 200, description = "Batch summary, or an SSE stream when `stream` is set", body = GenerateEmbeddingsResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn generate_embeddings<S, P>(
    State(service): State<Arc<EmbeddingService<S, P>>>,
    user: UserContext,
    ValidatedJson(request): ValidatedJson<GenerateEmbeddingsRequest>,
) -> EmbeddingResult<Response>
where
    S: EmbeddingStore + 'static,
    P: PhotoDirectory + 'static,
{
    if !request.stream {
        let response = service.generate(user.user_id, request).await?;
        return Ok(Json(response).into_response());
    }

    let (mut events, token) = service.generate_stream(user.user_id, request).await?;

    let stream = async_stream::stream! {
        // Dropping the body (client gone) cancels the batch
        let _guard = token.drop_guard();

        while let Some(event) = events.recv().await {
            match event.payload() {
                Ok(data) => {
                    yield Ok::<Event, Infallible>(Event::default().event(event.name()).data(data));
                }
                Err(e) => {
                    warn!(event = event.name(), error = %e, "Failed to encode batch event");
                }
            }
        }
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}
