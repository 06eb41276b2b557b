//! Photo Embeddings Domain
//!
//! Batch generation of image embeddings and their 2D/3D visualization.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Handlers   │  ← GET/POST /photos/embeddings, SSE progress
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │   Service    │  ← target resolution, fast-fail checks
//! └──┬────────┬──┘
//!    │        │
//! ┌──▼─────┐ ┌▼──────────────────────────────┐
//! │ Batch  │ │ Visualization                 │
//! │ (pool, │ │ (projection + clustering)     │
//! │ chunks)│ └───────────────────────────────┘
//! └──┬─────┘
//!    │
//! ┌──▼──────────────────────────────────────────┐
//! │ Generator · EmbeddingStore · PhotoDirectory  │  ← traits + adapters
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_photo_embeddings::{
//!     BatchConfig, EmbeddingService, InMemoryEmbeddingStore, InMemoryPhotoDirectory, handlers,
//! };
//!
//! let service = EmbeddingService::new(
//!     InMemoryEmbeddingStore::new(),
//!     InMemoryPhotoDirectory::new(),
//!     None,
//!     BatchConfig::default(),
//! );
//!
//! let router = handlers::router(service);
//! ```

pub mod batch;
pub mod clustering;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod projection;
pub mod repository;
pub mod service;
pub mod visualization;

// Re-export commonly used types
pub use batch::{
    BatchConfig, BatchEvent, BatchItem, BatchOrchestrator, BatchStrategy, BatchSummary,
    ProgressCounter,
};
pub use clustering::{ClusterConfig, Clusterer, cluster_count};
pub use error::{EmbeddingError, EmbeddingResult};
pub use generator::{EmbeddingGenerator, HttpEmbedderConfig, HttpImageEmbedder};
pub use memory::{InMemoryEmbeddingStore, InMemoryPhotoDirectory};
pub use models::{
    DEFAULT_DIMENSION, Dims, GenerateEmbeddingsRequest, GenerateEmbeddingsResponse, MAX_DIMENSION,
    Photo, PhotoEmbedding, VisualizationPoint, VisualizationResponse,
};
pub use projection::Projector;
pub use repository::{EmbeddingStore, PhotoDirectory};
pub use service::{BatchPlan, EmbeddingService};
pub use visualization::VisualizationAssembler;
