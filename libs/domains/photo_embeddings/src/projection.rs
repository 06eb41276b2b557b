//! PCA projection of embeddings onto 2 or 3 plotting axes.
//!
//! The top principal directions of the centered `N x D` matrix `M` are the
//! leading eigenvectors of `MᵗM`. They are found by subspace iteration on
//! `MᵗM` applied implicitly (`Mᵗ(MQ)`), so neither a `D x D` covariance nor a
//! full SVD is ever formed. Each iteration ends with a Rayleigh-Ritz step that
//! orders the directions by explained variance.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::Dims;

const JACOBI_SWEEPS: usize = 64;

/// Stack equal-length vectors into an `N x D` matrix.
pub fn stack_rows(rows: &[&[f32]]) -> EmbeddingResult<Array2<f64>> {
    let n = rows.len();
    let d = rows.first().map_or(0, |r| r.len());

    let mut flat = Vec::with_capacity(n * d);
    for row in rows {
        if row.len() != d {
            return Err(EmbeddingError::Internal(format!(
                "cannot stack vectors of length {} and {}",
                d,
                row.len()
            )));
        }
        flat.extend(row.iter().map(|&v| f64::from(v)));
    }

    Array2::from_shape_vec((n, d), flat).map_err(|e| EmbeddingError::Internal(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct Projector {
    pub max_iterations: usize,
    /// Convergence threshold on `1 - |cos|` between successive directions
    pub tolerance: f64,
    /// Directions whose eigenvalue is below this fraction of the largest are zeroed
    pub rank_tolerance: f64,
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-12,
            rank_tolerance: 1e-10,
        }
    }
}

impl Projector {
    /// Project the rows of `data` to `dims` coordinates each.
    ///
    /// Returns an `N x dims.axes()` matrix with every value in `[-1, 1]`: all
    /// axes are divided by the single largest absolute coordinate, which keeps
    /// relative distances intact. Zero rows yield an empty matrix, a single row
    /// sits at the origin, and axes beyond the data's rank are exactly 0.
    ///
    /// Output depends only on the input: each direction's sign is chosen so its
    /// largest-magnitude component is positive.
    pub fn project(&self, data: ArrayView2<'_, f64>, dims: Dims) -> Array2<f64> {
        let (n, d) = data.dim();
        let k = dims.axes();
        let mut out = Array2::<f64>::zeros((n, k));
        if n < 2 || d == 0 {
            return out;
        }

        let centered = match data.mean_axis(Axis(0)) {
            Some(mean) => &data - &mean,
            None => return out,
        };

        let r = k.min(d);
        let (directions, eigenvalues) = self.principal_directions(&centered, r);

        let largest = eigenvalues.first().copied().unwrap_or(0.0);
        let mut coords = centered.dot(&directions);
        for (axis, &lambda) in eigenvalues.iter().enumerate() {
            if largest <= 0.0 || lambda <= self.rank_tolerance * largest {
                coords.column_mut(axis).fill(0.0);
            }
        }

        let scale = coords.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if scale > 0.0 {
            coords.mapv_inplace(|v| v / scale);
        }

        out.slice_mut(ndarray::s![.., ..r]).assign(&coords);
        out
    }

    /// Top `r` eigenpairs of `MᵗM`, eigenvalues descending, sign-normalized.
    fn principal_directions(&self, m: &Array2<f64>, r: usize) -> (Array2<f64>, Vec<f64>) {
        let (n, d) = m.dim();

        // Deterministic start: Mᵗ applied to a fixed non-constant N x r block.
        // A constant block would vanish since centered columns sum to zero.
        let seed =
            Array2::from_shape_fn((n, r), |(i, j)| ((i + 1) as f64 * (j + 1) as f64).cos());
        let start = orthonormalize(m.t().dot(&seed));
        let (mut q, mut eigenvalues) = rayleigh_ritz(m, &start);

        for _ in 0..self.max_iterations {
            let z = m.t().dot(&m.dot(&q));
            let (next, next_eigenvalues) = rayleigh_ritz(m, &orthonormalize(z));

            let converged = (0..r).all(|j| {
                let cos = next.column(j).dot(&q.column(j)).abs();
                1.0 - cos <= self.tolerance
            });

            q = next;
            eigenvalues = next_eigenvalues;
            if converged {
                break;
            }
        }

        debug_assert_eq!(q.dim(), (d, r));
        fix_signs(&mut q);
        (q, eigenvalues)
    }
}

/// Modified Gram-Schmidt with re-orthogonalization.
///
/// A column that collapses onto earlier ones is replaced by the first standard
/// basis vector that is still independent, so the result is always a full
/// orthonormal basis.
fn orthonormalize(z: Array2<f64>) -> Array2<f64> {
    let (d, r) = z.dim();
    let reference = z
        .columns()
        .into_iter()
        .map(|c| c.dot(&c).sqrt())
        .fold(0.0_f64, f64::max);
    let collapse = 1e-10 * reference.max(f64::MIN_POSITIVE);

    let mut q = Array2::<f64>::zeros((d, r));
    let mut fallback = 0usize;

    for j in 0..r {
        let mut v = orthogonal_residual(&q, j, z.column(j).to_owned());
        let mut norm = v.dot(&v).sqrt();

        while norm <= collapse && fallback < d {
            let mut e = Array1::<f64>::zeros(d);
            e[fallback] = 1.0;
            fallback += 1;
            v = orthogonal_residual(&q, j, e);
            norm = v.dot(&v).sqrt();
            if norm < 0.5 {
                norm = 0.0;
            }
        }

        if norm > 0.0 {
            q.column_mut(j).assign(&(v / norm));
        }
    }

    q
}

fn orthogonal_residual(q: &Array2<f64>, upto: usize, mut v: Array1<f64>) -> Array1<f64> {
    for _ in 0..2 {
        for i in 0..upto {
            let qi = q.column(i);
            let proj = qi.dot(&v);
            v.scaled_add(-proj, &qi);
        }
    }
    v
}

/// Rotate `q` within its span onto the eigenvectors of `(MQ)ᵗ(MQ)`.
fn rayleigh_ritz(m: &Array2<f64>, q: &Array2<f64>) -> (Array2<f64>, Vec<f64>) {
    let p = m.dot(q);
    let b = p.t().dot(&p);
    let (values, vectors) = symmetric_eigen(b);

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[j].total_cmp(&values[i]).then(i.cmp(&j)));

    let rotated = q.dot(&vectors.select(Axis(1), &order));
    let sorted = order.iter().map(|&i| values[i].max(0.0)).collect();
    (rotated, sorted)
}

/// Cyclic Jacobi eigen-decomposition of a small symmetric matrix.
///
/// Returns eigenvalues and the matrix whose columns are the eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    let total: f64 = a.iter().map(|x| x * x).sum();

    for _ in 0..JACOBI_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= 1e-30 * total.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..n).map(|i| a[[i, i]]).collect(), v)
}

/// Flip each column so its largest-magnitude entry is positive.
/// The first such entry wins on ties.
fn fix_signs(q: &mut Array2<f64>) {
    for mut column in q.columns_mut() {
        let mut pivot = 0.0_f64;
        for &value in column.iter() {
            if value.abs() > pivot.abs() {
                pivot = value;
            }
        }
        if pivot < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const EPS: f64 = 1e-9;

    fn sample() -> Array2<f64> {
        Array2::from_shape_fn((12, 6), |(i, j)| {
            let i = i as f64;
            let j = j as f64;
            (i * 0.7 + j).sin() * (j + 1.0) + (i * 1.3).cos() * 0.5
        })
    }

    #[test]
    fn test_empty_input_yields_no_points() {
        let data = Array2::<f64>::zeros((0, 8));
        let out = Projector::default().project(data.view(), Dims::Two);
        assert_eq!(out.dim(), (0, 2));
    }

    #[test]
    fn test_single_point_sits_at_origin() {
        let data = array![[0.3, -1.2, 4.0]];
        let out = Projector::default().project(data.view(), Dims::Three);
        assert_eq!(out, Array2::<f64>::zeros((1, 3)));
    }

    #[test]
    fn test_two_points_use_one_axis() {
        let data = array![[1.0, 2.0, 3.0, 4.0], [2.0, 0.0, 3.0, 5.0]];
        let out = Projector::default().project(data.view(), Dims::Three);

        assert!((out[[0, 0]].abs() - 1.0).abs() < EPS);
        assert!((out[[0, 0]] + out[[1, 0]]).abs() < EPS);
        for row in 0..2 {
            assert_eq!(out[[row, 1]], 0.0);
            assert_eq!(out[[row, 2]], 0.0);
        }
    }

    #[test]
    fn test_points_on_a_line_keep_their_order() {
        let data = Array2::from_shape_fn((5, 4), |(i, j)| if j == 0 { i as f64 } else { 0.0 });
        let out = Projector::default().project(data.view(), Dims::Two);

        for i in 1..5 {
            assert!(out[[i, 0]] > out[[i - 1, 0]]);
            assert_eq!(out[[i, 1]], 0.0);
        }
        assert!((out[[4, 0]] - 1.0).abs() < EPS);
        assert!((out[[0, 0]] + 1.0).abs() < EPS);
    }

    #[test]
    fn test_first_axis_follows_largest_variance() {
        let data = array![
            [0.0, 10.0, 0.0],
            [0.0, -10.0, 0.0],
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0]
        ];
        let out = Projector::default().project(data.view(), Dims::Two);

        assert!((out[[0, 0]].abs() - 1.0).abs() < EPS);
        assert!(out[[2, 0]].abs() < EPS);
        assert!((out[[2, 1]].abs() - 0.1).abs() < EPS);
        assert!(out[[0, 1]].abs() < EPS);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let data = sample();
        let first = Projector::default().project(data.view(), Dims::Three);
        let second = Projector::default().project(data.view(), Dims::Three);
        assert_eq!(first, second);
    }

    #[test]
    fn test_axis_signs_follow_the_data() {
        // Negating the input flips every direction back to the same sign, so
        // the layout mirrors through the origin instead of changing shape.
        let data = sample();
        let negated = data.mapv(|v| -v);

        let out = Projector::default().project(data.view(), Dims::Three);
        let mirrored = Projector::default().project(negated.view(), Dims::Three);

        for (a, b) in out.iter().zip(mirrored.iter()) {
            assert!((a + b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_directions_have_positive_dominant_entry() {
        let data = sample();
        let centered = &data - &data.mean_axis(Axis(0)).unwrap();
        let (q, eigenvalues) = Projector::default().principal_directions(&centered, 3);

        assert!(eigenvalues.windows(2).all(|w| w[0] >= w[1]));
        for column in q.columns() {
            let dominant = column
                .iter()
                .fold(0.0_f64, |acc, &v| if v.abs() > acc.abs() { v } else { acc });
            assert!(dominant > 0.0);
            assert!((column.dot(&column) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_coordinates_are_bounded() {
        let out = Projector::default().project(sample().view(), Dims::Two);
        let max = out.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!((max - 1.0).abs() < EPS);
    }

    #[test]
    fn test_stack_rows_rejects_ragged_input() {
        let a = [1.0_f32, 2.0];
        let b = [1.0_f32];
        assert!(stack_rows(&[&a, &b]).is_err());

        let stacked = stack_rows(&[&a, &a]).unwrap();
        assert_eq!(stacked.dim(), (2, 2));
    }

    #[test]
    fn test_jacobi_recovers_known_eigenvalues() {
        let (mut values, _) = symmetric_eigen(array![[2.0, 1.0], [1.0, 2.0]]);
        values.sort_by(f64::total_cmp);
        assert!((values[0] - 1.0).abs() < EPS);
        assert!((values[1] - 3.0).abs() < EPS);
    }
}
