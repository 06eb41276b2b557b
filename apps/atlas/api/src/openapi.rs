use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "Atlas API",
        version = "0.1.0",
        description = "Photo embedding generation and visualization"
    ),
    servers(
        (url = "/api", description = "API base path")
    )
)]
struct BaseDoc;

/// Service document: the base info merged with every domain's paths.
pub struct ApiDoc;

impl OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        let mut doc = BaseDoc::openapi();
        doc.merge(domain_photo_embeddings::handlers::ApiDoc::openapi());
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_contains_embedding_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/photos/embeddings"));
        assert_eq!(doc.info.title, "Atlas API");
    }
}
