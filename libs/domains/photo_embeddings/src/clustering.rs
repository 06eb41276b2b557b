//! K-means over the full-dimensional embeddings.
//!
//! K adapts to the number of points, seeds come from farthest-point sampling
//! starting at row 0, and every tie goes to the lower index. The same rows in
//! the same order always produce the same assignment.

use ndarray::{Array2, ArrayView1, ArrayView2};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Upper bound on K
    pub max_clusters: usize,
    pub max_iterations: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_clusters: 20,
            max_iterations: 50,
        }
    }
}

/// `clamp(round(sqrt(n / 2)), 1, max_clusters)`, never more than `n`.
pub fn cluster_count(n: usize, max_clusters: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let k = (n as f64 / 2.0).sqrt().round() as usize;
    k.clamp(1, max_clusters.max(1)).min(n)
}

#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: ClusterConfig,
}

impl Clusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// One 0-based cluster id per row of `data`.
    pub fn cluster(&self, data: ArrayView2<'_, f64>) -> Vec<usize> {
        let n = data.nrows();
        let k = cluster_count(n, self.config.max_clusters);
        if k >= n {
            return (0..n).collect();
        }

        let mut centroids = seed_centroids(data, k);
        let mut assignments = vec![usize::MAX; n];

        for iteration in 0..self.config.max_iterations {
            let mut changed = false;
            for (i, row) in data.rows().into_iter().enumerate() {
                let nearest = nearest_centroid(row, &centroids);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            if !changed {
                tracing::debug!(iterations = iteration, clusters = k, "K-means converged");
                break;
            }

            update_centroids(data, &assignments, &mut centroids);
        }

        assignments
    }
}

/// Farthest-point sampling: row 0 first, then repeatedly the unchosen row
/// whose distance to its nearest chosen centroid is largest.
fn seed_centroids(data: ArrayView2<'_, f64>, k: usize) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    let mut chosen = vec![false; n];
    let mut min_dist = vec![f64::INFINITY; n];

    let mut next = 0usize;
    for c in 0..k {
        chosen[next] = true;
        centroids.row_mut(c).assign(&data.row(next));

        for (i, row) in data.rows().into_iter().enumerate() {
            let d = squared_distance(row, data.row(next));
            if d < min_dist[i] {
                min_dist[i] = d;
            }
        }

        let mut best: Option<usize> = None;
        for i in 0..n {
            if chosen[i] {
                continue;
            }
            match best {
                Some(b) if min_dist[i] <= min_dist[b] => {}
                _ => best = Some(i),
            }
        }
        match best {
            Some(b) => next = b,
            None => break,
        }
    }

    centroids
}

fn nearest_centroid(row: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let d = squared_distance(row, centroid);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

/// Move each centroid to the mean of its points. Empty clusters stay put.
fn update_centroids(data: ArrayView2<'_, f64>, assignments: &[usize], centroids: &mut Array2<f64>) {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
    let mut counts = vec![0usize; k];

    for (row, &cluster) in data.rows().into_iter().zip(assignments) {
        let mut sum = sums.row_mut(cluster);
        sum += &row;
        counts[cluster] += 1;
    }

    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mean = sums.row(c).mapv(|v| v / count as f64);
            centroids.row_mut(c).assign(&mean);
        }
    }
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
