use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Dimension used when a generation request does not name one.
pub const DEFAULT_DIMENSION: u32 = 512;

/// Largest dimension a caller may request.
pub const MAX_DIMENSION: u32 = 4096;

/// Stored embedding for one photo. At most one per `(user_id, photo_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEmbedding {
    pub photo_id: Uuid,
    pub user_id: Uuid,
    pub vector: Vec<f32>,
    pub dimension: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A photo as seen by this domain. Owned by the photo storage service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Where the generator can fetch the full image
    pub image_ref: String,
    pub thumbnail_ref: String,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Plot position of one embedding. Recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub photo_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub photo_id: Uuid,
    pub cluster_id: usize,
}

/// Number of plotting axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dims {
    #[default]
    Two,
    Three,
}

impl Dims {
    pub fn axes(self) -> usize {
        match self {
            Dims::Two => 2,
            Dims::Three => 3,
        }
    }
}

impl TryFrom<u8> for Dims {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Dims::Two),
            3 => Ok(Dims::Three),
            other => Err(format!("dims must be 2 or 3, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisualizationQuery {
    /// 2 (default) or 3
    pub dims: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    pub captured_at: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationPoint {
    pub photo_id: Uuid,
    pub thumbnail_url: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    pub cluster: usize,
    pub metadata: PhotoMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationResponse {
    /// Number of entries in `visualizations`
    pub count: usize,
    /// All of the caller's photos, with or without an embedding
    pub total_photos: usize,
    pub visualizations: Vec<VisualizationPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /photos/embeddings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_targets"))]
pub struct GenerateEmbeddingsRequest {
    #[serde(default)]
    pub photo_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    #[validate(range(min = 1, max = 4096))]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub stream: bool,
    /// Regenerate photos that already have an embedding
    #[serde(default)]
    pub force: bool,
}

impl GenerateEmbeddingsRequest {
    pub fn has_targets(&self) -> bool {
        self.all || self.photo_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }
}

fn validate_targets(request: &GenerateEmbeddingsRequest) -> Result<(), ValidationError> {
    if request.has_targets() {
        Ok(())
    } else {
        Err(ValidationError::new("missing_targets")
            .with_message("either photoIds or all=true is required".into()))
    }
}

/// Summary of a non-streaming generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEmbeddingsResponse {
    pub generated: usize,
    pub failed: usize,
    pub failed_ids: Vec<Uuid>,
    /// Embeddings stored for the caller after the run
    pub total_embeddings: usize,
    pub message: String,
}
