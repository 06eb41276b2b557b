//! Read-side composition of stored embeddings into plot points.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clustering::Clusterer;
use crate::error::EmbeddingResult;
use crate::models::{
    ClusterAssignment, Dims, Photo, PhotoEmbedding, PhotoMetadata, ProjectedPoint,
    VisualizationPoint,
};
use crate::projection::{Projector, stack_rows};

/// Joins embeddings, their parent photos, projection and clustering.
///
/// Pure: no I/O, safe to share across requests.
#[derive(Debug, Clone, Default)]
pub struct VisualizationAssembler {
    projector: Projector,
    clusterer: Clusterer,
}

impl VisualizationAssembler {
    pub fn new(projector: Projector, clusterer: Clusterer) -> Self {
        Self {
            projector,
            clusterer,
        }
    }

    /// One point per embedding whose parent photo is in `photos`, ordered by
    /// photo id.
    ///
    /// Orphans are skipped. When dimensions are mixed only the most common one
    /// is kept.
    pub fn assemble(
        &self,
        embeddings: Vec<PhotoEmbedding>,
        photos: &[Photo],
        dims: Dims,
    ) -> EmbeddingResult<Vec<VisualizationPoint>> {
        let by_id: HashMap<Uuid, &Photo> = photos.iter().map(|p| (p.id, p)).collect();

        let stored = embeddings.len();
        let mut rows: Vec<PhotoEmbedding> = embeddings
            .into_iter()
            .filter(|e| by_id.contains_key(&e.photo_id))
            .collect();
        if rows.len() < stored {
            debug!(orphans = stored - rows.len(), "Skipping embeddings without a photo");
        }

        if let Some(dimension) = dominant_dimension(&rows) {
            let before = rows.len();
            rows.retain(|e| e.dimension == dimension && e.vector.len() == dimension as usize);
            if rows.len() < before {
                warn!(
                    dimension,
                    dropped = before - rows.len(),
                    "Dropping embeddings with a different dimension"
                );
            }
        }

        rows.sort_by_key(|e| e.photo_id);

        let projected = self.project(&rows, dims)?;
        let clusters = self.cluster(&rows)?;

        let points = rows
            .iter()
            .zip(projected)
            .zip(clusters)
            .filter_map(|((embedding, point), assignment)| {
                let photo = by_id.get(&embedding.photo_id)?;
                Some(VisualizationPoint {
                    photo_id: point.photo_id,
                    thumbnail_url: photo.thumbnail_ref.clone(),
                    x: point.x,
                    y: point.y,
                    z: point.z,
                    cluster: assignment.cluster_id,
                    metadata: PhotoMetadata {
                        captured_at: photo.captured_at,
                        location: photo.location,
                    },
                })
            })
            .collect();

        Ok(points)
    }

    fn project(&self, rows: &[PhotoEmbedding], dims: Dims) -> EmbeddingResult<Vec<ProjectedPoint>> {
        let vectors: Vec<&[f32]> = rows.iter().map(|e| e.vector.as_slice()).collect();
        let data = stack_rows(&vectors)?;
        let coords = self.projector.project(data.view(), dims);

        Ok(rows
            .iter()
            .zip(coords.rows())
            .map(|(embedding, c)| ProjectedPoint {
                photo_id: embedding.photo_id,
                x: c[0],
                y: c[1],
                z: match dims {
                    Dims::Two => None,
                    Dims::Three => Some(c[2]),
                },
            })
            .collect())
    }

    fn cluster(&self, rows: &[PhotoEmbedding]) -> EmbeddingResult<Vec<ClusterAssignment>> {
        let vectors: Vec<&[f32]> = rows.iter().map(|e| e.vector.as_slice()).collect();
        let data = stack_rows(&vectors)?;
        let labels = self.clusterer.cluster(data.view());

        Ok(rows
            .iter()
            .zip(labels)
            .map(|(embedding, cluster_id)| ClusterAssignment {
                photo_id: embedding.photo_id,
                cluster_id,
            })
            .collect())
    }
}

/// Most frequent dimension; ties go to the larger one.
fn dominant_dimension(rows: &[PhotoEmbedding]) -> Option<u32> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.dimension).or_default() += 1;
    }
    // max_by_key returns the last maximum, and BTreeMap iterates ascending
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(dimension, _)| dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn photo(id: Uuid, user_id: Uuid) -> Photo {
        Photo {
            id,
            user_id,
            image_ref: format!("images/{}.jpg", id),
            thumbnail_ref: format!("thumbs/{}.jpg", id),
            captured_at: None,
            location: None,
        }
    }

    fn embedding(photo_id: Uuid, user_id: Uuid, vector: Vec<f32>) -> PhotoEmbedding {
        PhotoEmbedding {
            photo_id,
            user_id,
            dimension: vector.len() as u32,
            vector,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_input() {
        let points = VisualizationAssembler::default()
            .assemble(vec![], &[], Dims::Two)
            .unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_orphaned_embeddings_are_dropped() {
        let user = Uuid::new_v4();
        let kept: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let deleted = Uuid::new_v4();

        let photos: Vec<Photo> = kept.iter().map(|&id| photo(id, user)).collect();
        let mut embeddings: Vec<PhotoEmbedding> = kept
            .iter()
            .enumerate()
            .map(|(i, &id)| embedding(id, user, vec![i as f32, 1.0, 0.0]))
            .collect();
        embeddings.push(embedding(deleted, user, vec![9.0, 9.0, 9.0]));

        let points = VisualizationAssembler::default()
            .assemble(embeddings, &photos, Dims::Two)
            .unwrap();

        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.photo_id != deleted));
        assert!(points.iter().all(|p| p.z.is_none()));
    }

    #[test]
    fn test_points_are_sorted_and_joined_with_photos() {
        let user = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let photos: Vec<Photo> = ids.iter().map(|&id| photo(id, user)).collect();
        let embeddings = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| embedding(id, user, vec![i as f32, (i * i) as f32]))
            .collect();

        let points = VisualizationAssembler::default()
            .assemble(embeddings, &photos, Dims::Three)
            .unwrap();

        let mut sorted = ids.clone();
        sorted.sort();
        let order: Vec<Uuid> = points.iter().map(|p| p.photo_id).collect();
        assert_eq!(order, sorted);

        for point in &points {
            assert_eq!(point.thumbnail_url, format!("thumbs/{}.jpg", point.photo_id));
            assert!(point.z.is_some());
            assert!(point.x.abs() <= 1.0 + 1e-9 && point.y.abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_input_order_does_not_change_layout() {
        let user = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let photos: Vec<Photo> = ids.iter().map(|&id| photo(id, user)).collect();
        let embeddings: Vec<PhotoEmbedding> = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let t = i as f32;
                embedding(id, user, vec![t.sin(), t.cos(), t * 0.1, 1.0])
            })
            .collect();
        let mut reversed = embeddings.clone();
        reversed.reverse();

        let assembler = VisualizationAssembler::default();
        let first = assembler.assemble(embeddings, &photos, Dims::Two).unwrap();
        let second = assembler.assemble(reversed, &photos, Dims::Two).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_dimensions_keep_the_most_common() {
        let user = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let photos: Vec<Photo> = ids.iter().map(|&id| photo(id, user)).collect();
        let embeddings = vec![
            embedding(ids[0], user, vec![1.0, 0.0, 0.0]),
            embedding(ids[1], user, vec![0.0, 1.0, 0.0]),
            embedding(ids[2], user, vec![0.0, 0.0, 1.0]),
            embedding(ids[3], user, vec![1.0, 1.0]),
        ];

        let points = VisualizationAssembler::default()
            .assemble(embeddings, &photos, Dims::Two)
            .unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.photo_id != ids[3]));
    }

    #[test]
    fn test_dominant_dimension_tie_prefers_larger() {
        let user = Uuid::new_v4();
        let rows = vec![
            embedding(Uuid::new_v4(), user, vec![0.0; 2]),
            embedding(Uuid::new_v4(), user, vec![0.0; 4]),
        ];
        assert_eq!(dominant_dimension(&rows), Some(4));
        assert_eq!(dominant_dimension(&[]), None);
    }
}
