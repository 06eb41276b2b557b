use async_trait::async_trait;

use crate::error::EmbeddingResult;

/// Produces an embedding for one image.
///
/// The model behind it is opaque and may be slow or rate limited. Callers
/// bound concurrency and time themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed the image at `image_ref` into a vector of length `dimension`
    async fn generate(&self, image_ref: &str, dimension: u32) -> EmbeddingResult<Vec<f32>>;
}
