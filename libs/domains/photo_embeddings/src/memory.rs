//! In-process adapters for the store and photo directory.
//!
//! The embedding store lives for the process lifetime. The photo directory can
//! be seeded from a JSON catalog exported by the photo service.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::{Photo, PhotoEmbedding};
use crate::repository::{EmbeddingStore, PhotoDirectory};

#[derive(Clone, Default)]
pub struct InMemoryEmbeddingStore {
    rows: Arc<RwLock<HashMap<(Uuid, Uuid), PhotoEmbedding>>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the embedding for one photo, mirroring a photo delete cascade.
    pub async fn remove(&self, user_id: Uuid, photo_id: Uuid) -> bool {
        self.rows.write().await.remove(&(user_id, photo_id)).is_some()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn find_by_user_id(&self, user_id: Uuid) -> EmbeddingResult<Vec<PhotoEmbedding>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        photo_id: Uuid,
        user_id: Uuid,
        vector: Vec<f32>,
        dimension: u32,
    ) -> EmbeddingResult<()> {
        if vector.len() != dimension as usize {
            return Err(EmbeddingError::Store(format!(
                "vector length {} does not match dimension {}",
                vector.len(),
                dimension
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Store(
                "vector contains a non-finite component".to_string(),
            ));
        }

        let row = PhotoEmbedding {
            photo_id,
            user_id,
            vector,
            dimension,
            created_at: Utc::now(),
        };

        let replaced = self.rows.write().await.insert((user_id, photo_id), row);
        debug!(
            photo_id = %photo_id,
            user_id = %user_id,
            replaced = replaced.is_some(),
            "Stored embedding"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPhotoDirectory {
    photos: Arc<RwLock<HashMap<Uuid, Photo>>>,
}

impl InMemoryPhotoDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_photos(photos: impl IntoIterator<Item = Photo>) -> Self {
        let map = photos.into_iter().map(|p| (p.id, p)).collect();
        Self {
            photos: Arc::new(RwLock::new(map)),
        }
    }

    /// Load a JSON array of photos.
    pub async fn from_json_file(path: impl AsRef<Path>) -> EmbeddingResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let photos: Vec<Photo> = serde_json::from_slice(&raw)?;

        info!(path = %path.display(), photos = photos.len(), "Loaded photo catalog");
        Ok(Self::with_photos(photos))
    }

    pub async fn insert(&self, photo: Photo) {
        self.photos.write().await.insert(photo.id, photo);
    }

    pub async fn remove(&self, id: Uuid) -> Option<Photo> {
        self.photos.write().await.remove(&id)
    }
}

#[async_trait]
impl PhotoDirectory for InMemoryPhotoDirectory {
    async fn find_by_ids(&self, user_id: Uuid, ids: &[Uuid]) -> EmbeddingResult<Vec<Photo>> {
        let photos = self.photos.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| photos.get(id))
            .filter(|photo| photo.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_owner(&self, user_id: Uuid) -> EmbeddingResult<Vec<Photo>> {
        let photos = self.photos.read().await;
        let mut owned: Vec<Photo> = photos
            .values()
            .filter(|photo| photo.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|photo| photo.id);
        Ok(owned)
    }

    async fn count_by_owner(&self, user_id: Uuid) -> EmbeddingResult<usize> {
        let photos = self.photos.read().await;
        Ok(photos.values().filter(|p| p.user_id == user_id).count())
    }
}
