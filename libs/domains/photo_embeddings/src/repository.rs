use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EmbeddingResult;
use crate::models::{Photo, PhotoEmbedding};

/// Per-user embedding storage.
///
/// Keyed by `(user_id, photo_id)`; a second upsert for the same key replaces
/// the stored vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// All embeddings owned by `user_id`, in no particular order
    async fn find_by_user_id(&self, user_id: Uuid) -> EmbeddingResult<Vec<PhotoEmbedding>>;

    /// Create or replace the embedding for `(user_id, photo_id)`.
    ///
    /// Rejects vectors whose length differs from `dimension`.
    async fn upsert(
        &self,
        photo_id: Uuid,
        user_id: Uuid,
        vector: Vec<f32>,
        dimension: u32,
    ) -> EmbeddingResult<()>;
}

/// Read-only view of the photo storage service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoDirectory: Send + Sync {
    /// Photos among `ids` that exist and belong to `user_id`
    async fn find_by_ids(&self, user_id: Uuid, ids: &[Uuid]) -> EmbeddingResult<Vec<Photo>>;

    /// Every photo owned by `user_id`
    async fn list_by_owner(&self, user_id: Uuid) -> EmbeddingResult<Vec<Photo>>;

    async fn count_by_owner(&self, user_id: Uuid) -> EmbeddingResult<usize>;
}
