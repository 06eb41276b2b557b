//! Application state management.
//!
//! Holds the embedding service shared by the HTTP handlers and the readiness
//! probe, plus the token that stops running batches on shutdown.

use domain_photo_embeddings::{EmbeddingService, InMemoryEmbeddingStore, InMemoryPhotoDirectory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type PhotoEmbeddingService = EmbeddingService<InMemoryEmbeddingStore, InMemoryPhotoDirectory>;

/// Shared application state.
///
/// Cloned for each handler (Arc clones only).
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    pub embeddings: Arc<PhotoEmbeddingService>,
    /// Parent of every batch token; cancelled during shutdown cleanup
    pub shutdown: CancellationToken,
}
