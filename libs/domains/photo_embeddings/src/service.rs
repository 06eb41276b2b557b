use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use observability::EmbeddingMetrics;

use crate::batch::{BatchConfig, BatchEvent, BatchItem, BatchOrchestrator, BatchSummary};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::generator::EmbeddingGenerator;
use crate::models::{
    Dims, GenerateEmbeddingsRequest, GenerateEmbeddingsResponse, MAX_DIMENSION,
    VisualizationResponse,
};
use crate::repository::{EmbeddingStore, PhotoDirectory};
use crate::visualization::VisualizationAssembler;

/// Buffered batch events per streaming request
const EVENT_BUFFER: usize = 32;

pub const NO_EMBEDDINGS_MESSAGE: &str = "no embeddings yet";

/// Resolved work for one generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub dimension: u32,
    pub items: Vec<BatchItem>,
    /// Requested photos left out because they already have an embedding
    pub skipped: usize,
}

/// Service layer for photo embedding visualization and generation
pub struct EmbeddingService<S: EmbeddingStore, P: PhotoDirectory> {
    store: Arc<S>,
    photos: Arc<P>,
    generator: Option<Arc<dyn EmbeddingGenerator>>,
    assembler: VisualizationAssembler,
    batch_config: BatchConfig,
    shutdown: CancellationToken,
}

impl<S, P> EmbeddingService<S, P>
where
    S: EmbeddingStore + 'static,
    P: PhotoDirectory + 'static,
{
    pub fn new(
        store: S,
        photos: P,
        generator: Option<Arc<dyn EmbeddingGenerator>>,
        batch_config: BatchConfig,
    ) -> Self {
        Self {
            store: Arc::new(store),
            photos: Arc::new(photos),
            generator,
            assembler: VisualizationAssembler::default(),
            batch_config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Parent token for every batch this service starts. Cancelling it stops
    /// all running batches.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_generator_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Whether the photo directory answers a query.
    pub async fn photo_directory_ready(&self) -> bool {
        self.photos.count_by_owner(Uuid::nil()).await.is_ok()
    }

    /// Project and cluster every embedding the user owns.
    #[instrument(skip_all, fields(user_id = %user_id, dims = dims.axes()))]
    pub async fn visualize(&self, user_id: Uuid, dims: Dims) -> EmbeddingResult<VisualizationResponse> {
        let embeddings = self.store.find_by_user_id(user_id).await?;
        let photos = self.photos.list_by_owner(user_id).await?;
        let total_photos = photos.len();

        let visualizations = self.assembler.assemble(embeddings, &photos, dims)?;
        let count = visualizations.len();
        EmbeddingMetrics::record_visualization(count);

        info!(count, total_photos, "Assembled visualization");

        Ok(VisualizationResponse {
            count,
            total_photos,
            visualizations,
            message: (count == 0).then(|| NO_EMBEDDINGS_MESSAGE.to_string()),
        })
    }

    /// Resolve the request to the photos that need an embedding.
    ///
    /// Explicit ids are limited to the caller's own photos. Photos that
    /// already have an embedding are skipped unless `force` is set.
    pub async fn plan(
        &self,
        user_id: Uuid,
        request: &GenerateEmbeddingsRequest,
    ) -> EmbeddingResult<BatchPlan> {
        let dimension = self.resolve_dimension(request)?;

        let candidates = if request.all {
            self.photos.list_by_owner(user_id).await?
        } else {
            let mut seen = HashSet::new();
            let ids: Vec<Uuid> = request
                .photo_ids
                .iter()
                .flatten()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect();
            self.photos.find_by_ids(user_id, &ids).await?
        };

        let existing: HashSet<Uuid> = if request.force {
            HashSet::new()
        } else {
            self.store
                .find_by_user_id(user_id)
                .await?
                .into_iter()
                .map(|e| e.photo_id)
                .collect()
        };

        let found = candidates.len();
        let items: Vec<BatchItem> = candidates
            .into_iter()
            .filter(|photo| !existing.contains(&photo.id))
            .map(|photo| BatchItem {
                photo_id: photo.id,
                image_ref: photo.image_ref,
            })
            .collect();

        Ok(BatchPlan {
            dimension,
            skipped: found - items.len(),
            items,
        })
    }

    /// Generate embeddings and wait for the whole batch.
    #[instrument(skip_all, fields(user_id = %user_id, all = request.all, force = request.force))]
    pub async fn generate(
        &self,
        user_id: Uuid,
        request: GenerateEmbeddingsRequest,
    ) -> EmbeddingResult<GenerateEmbeddingsResponse> {
        let orchestrator = self.prepare(&request)?;
        let plan = self.plan(user_id, &request).await?;

        if plan.items.is_empty() {
            let total_embeddings = self.store.find_by_user_id(user_id).await?.len();
            return Ok(GenerateEmbeddingsResponse {
                generated: 0,
                failed: 0,
                failed_ids: vec![],
                total_embeddings,
                message: if plan.skipped > 0 {
                    "All requested photos already have embeddings".to_string()
                } else {
                    "No photos to process".to_string()
                },
            });
        }

        let summary = orchestrator
            .run(
                user_id,
                plan.items,
                plan.dimension,
                None,
                self.shutdown.child_token(),
            )
            .await;

        if summary.cancelled {
            return Err(EmbeddingError::Cancelled);
        }

        let total_embeddings = self.store.find_by_user_id(user_id).await?.len();
        Ok(GenerateEmbeddingsResponse {
            message: summary_message(&summary),
            generated: summary.generated,
            failed: summary.failed,
            failed_ids: summary.failed_ids,
            total_embeddings,
        })
    }

    /// Start a batch in the background and hand back its event stream.
    ///
    /// The batch stops when the returned token is cancelled or the receiver
    /// is dropped.
    #[instrument(skip_all, fields(user_id = %user_id, all = request.all, force = request.force))]
    pub async fn generate_stream(
        &self,
        user_id: Uuid,
        request: GenerateEmbeddingsRequest,
    ) -> EmbeddingResult<(mpsc::Receiver<BatchEvent>, CancellationToken)> {
        let orchestrator = self.prepare(&request)?;
        let plan = self.plan(user_id, &request).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = self.shutdown.child_token();
        let run_token = token.clone();

        tokio::spawn(async move {
            orchestrator
                .run(user_id, plan.items, plan.dimension, Some(tx), run_token)
                .await;
        });

        Ok((rx, token))
    }

    /// Request checks that must pass before any photo is touched.
    fn prepare(&self, request: &GenerateEmbeddingsRequest) -> EmbeddingResult<BatchOrchestrator> {
        if !request.has_targets() {
            return Err(EmbeddingError::Validation(
                "either photoIds or all=true is required".to_string(),
            ));
        }
        self.resolve_dimension(request)?;

        let generator = self.generator.clone().ok_or_else(|| {
            EmbeddingError::GeneratorUnavailable("no embedding generator is configured".to_string())
        })?;
        let store: Arc<dyn EmbeddingStore> = self.store.clone();

        Ok(BatchOrchestrator::new(
            store,
            generator,
            self.batch_config.clone(),
        ))
    }

    fn resolve_dimension(&self, request: &GenerateEmbeddingsRequest) -> EmbeddingResult<u32> {
        let dimension = request
            .dimension
            .unwrap_or(self.batch_config.default_dimension);
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(EmbeddingError::Validation(format!(
                "dimension must be between 1 and {}",
                MAX_DIMENSION
            )));
        }
        Ok(dimension)
    }
}

fn summary_message(summary: &BatchSummary) -> String {
    if summary.failed == 0 {
        format!("Generated {} embeddings", summary.generated)
    } else {
        format!(
            "Generated {} embeddings, {} failed",
            summary.generated, summary.failed
        )
    }
}
