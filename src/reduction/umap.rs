//! Native UMAP (Uniform Manifold Approximation and Projection) with euclidean distances.
//!
//! The pipeline follows the reference algorithm:
//! 1. exact k-nearest-neighbour search
//! 2. per-sample bandwidth (`sigma`) and connectivity offset (`rho`) via binary search
//! 3. fuzzy union of the directed neighbourhood graphs
//! 4. stochastic layout optimization with negative sampling, starting from a random layout

use super::{backend::EmbeddingBackend, EmbeddingMethod};
use crate::{helpers, Error, Matrix, Result};
use nalgebra::{Matrix2, Vector2};
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const SMOOTH_K_ITERATIONS: usize = 64;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

/// Parameters of the [`Umap`] embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UmapParams {
    /// Neighbourhood size, counting the sample itself
    pub n_neighbors: usize,
    /// Minimum distance of points in the embedding
    pub min_dist: f64,
    /// Effective scale of the embedded points
    pub spread: f64,
    pub n_components: usize,
    /// Optimization epochs; 500 for up to 10 000 samples, 200 above when unset
    pub n_epochs: Option<usize>,
    pub learning_rate: f64,
    /// Negative samples per positive sample
    pub negative_sample_rate: usize,
    pub repulsion_strength: f64,
}
impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_components: 2,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
        }
    }
}
impl UmapParams {
    fn validate(&self) -> Result<()> {
        if self.n_neighbors < 2 {
            return Err(Error::invalid("n_neighbors", "must be at least 2"));
        }
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be at least 1"));
        }
        if !(self.spread > 0.0) || !(self.min_dist >= 0.0) || self.min_dist > self.spread {
            return Err(Error::invalid("min_dist", format!("expected 0 <= min_dist ({}) <= spread ({})", self.min_dist, self.spread)));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::invalid("learning_rate", "must be positive"));
        }
        Ok(())
    }
}

/// Weighted, symmetric edge of the fuzzy neighbourhood graph.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f64,
}

/// [`EmbeddingBackend`] computing a UMAP layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Umap {
    params: UmapParams,
}
impl Umap {
    pub fn new(params: UmapParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UmapParams {
        &self.params
    }
}

impl EmbeddingBackend for Umap {
    #[tracing::instrument(level = "debug", skip_all, fields(rows = data.rows(), cols = data.cols()))]
    fn embed(&self, data: &Matrix<f64>, rnd: &mut dyn RngCore) -> Result<Matrix<f64>> {
        let params = &self.params;
        params.validate()?;
        if data.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(Error::Reduction { method: EmbeddingMethod::Umap, reason: "input contains non-finite values".to_string() });
        }
        let n = data.rows();
        if n < 2 {
            return Matrix::zeros(n, params.n_components);
        }

        let k = (params.n_neighbors - 1).min(n - 1);
        let knn = nearest_neighbors(data, k);
        let (sigmas, rhos) = smooth_knn_dist(&knn, (k + 1) as f64);
        let graph = fuzzy_simplicial_set(&knn, &sigmas, &rhos);
        let (a, b) = find_ab_params(params.spread, params.min_dist);
        let n_epochs = params.n_epochs.unwrap_or(if n <= 10_000 { 500 } else { 200 });
        tracing::debug!(k, edges = graph.len(), a, b, n_epochs, "fuzzy graph built");

        let mut embedding: Vec<f64> = (0..n * params.n_components)
            .map(|_| rnd.gen_range(-INIT_RANGE..INIT_RANGE))
            .collect();
        optimize_layout(&mut embedding, params, &graph, a, b, n_epochs, rnd);
        Matrix::new(embedding, n, params.n_components)
    }
}

/// `k` nearest neighbours (euclidean) of every row, excluding the row itself, ascending by distance.
fn nearest_neighbors(data: &Matrix<f64>, k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..data.rows()).into_par_iter()
        .map(|i| {
            let sample = data.row(i);
            let mut dists: Vec<(usize, f64)> = data.iter_rows().enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, other)| (j, helpers::squared_distance(sample, other)))
                .collect();
            let by_distance = |x: &(usize, f64), y: &(usize, f64)| {
                x.1.partial_cmp(&y.1).unwrap_or(Ordering::Equal).then(x.0.cmp(&y.0))
            };
            if dists.len() > k {
                dists.select_nth_unstable_by(k, by_distance);
                dists.truncate(k);
            }
            dists.sort_by(by_distance);
            dists.into_iter().map(|(j, d)| (j, d.sqrt())).collect()
        })
        .collect()
}

/// Per-sample `(sigma, rho)` such that `sum_j exp(-(d_j - rho) / sigma) = log2(n_neighbors)`.
fn smooth_knn_dist(knn: &[Vec<(usize, f64)>], n_neighbors: f64) -> (Vec<f64>, Vec<f64>) {
    let target = n_neighbors.log2();
    let mean_all = {
        let (sum, cnt) = knn.iter().flatten().fold((0.0, 0usize), |(s, c), &(_, d)| (s + d, c + 1));
        if cnt > 0 { sum / cnt as f64 } else { 0.0 }
    };

    knn.iter()
        .map(|neighbors| {
            let rho = neighbors.iter().map(|&(_, d)| d).find(|&d| d > 0.0).unwrap_or(0.0);
            let (mut lo, mut hi, mut mid) = (0.0, f64::INFINITY, 1.0);
            for _ in 0..SMOOTH_K_ITERATIONS {
                let psum: f64 = neighbors.iter()
                    .map(|&(_, d)| {
                        let d = d - rho;
                        if d > 0.0 { (-d / mid).exp() } else { 1.0 }
                    })
                    .sum();
                if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                    break;
                }
                if psum > target {
                    hi = mid;
                    mid = (lo + hi) / 2.0;
                } else {
                    lo = mid;
                    mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
                }
            }

            let sigma = if rho > 0.0 {
                let mean_ith = neighbors.iter().map(|&(_, d)| d).sum::<f64>() / neighbors.len().max(1) as f64;
                mid.max(MIN_K_DIST_SCALE * mean_ith)
            } else {
                mid.max(MIN_K_DIST_SCALE * mean_all)
            };
            (sigma, rho)
        })
        .unzip()
}

/// Directed memberships `exp(-(d - rho_i) / sigma_i)`, symmetrised with the fuzzy union `a + b - a·b`.
/// Contains both directions of every edge.
fn fuzzy_simplicial_set(knn: &[Vec<(usize, f64)>], sigmas: &[f64], rhos: &[f64]) -> Vec<Edge> {
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, neighbors) in knn.iter().enumerate() {
        for &(j, d) in neighbors {
            let membership = if d - rhos[i] <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-(d - rhos[i]) / sigmas[i]).exp()
            };
            directed.insert((i, j), membership);
        }
    }

    let mut symmetric: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w_ij) in &directed {
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w_ij + w_ji - w_ij * w_ji;
        symmetric.insert((i, j), union);
        symmetric.insert((j, i), union);
    }
    symmetric.into_iter()
        .filter(|&(_, w)| w > 0.0)
        .map(|((head, tail), weight)| Edge { head, tail, weight })
        .collect()
}

/// Fit `1 / (1 + a·x^(2b))` to the target membership curve given by **spread** and **min_dist**
/// (Levenberg-Marquardt least squares).
pub fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    const SAMPLES: usize = 300;
    let xs: Vec<f64> = (0..SAMPLES).map(|i| spread * 3.0 * i as f64 / (SAMPLES - 1) as f64).collect();
    let ys: Vec<f64> = xs.iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();

    let curve = |a: f64, b: f64, x: f64| 1.0 / (1.0 + a * x.powf(2.0 * b));
    let cost = |p: &Vector2<f64>| -> f64 {
        xs.iter().zip(ys.iter()).map(|(&x, &y)| (curve(p[0], p[1], x) - y).powi(2)).sum()
    };

    let mut params = Vector2::new(1.0, 1.0);
    let mut current = cost(&params);
    let mut lambda = 1e-3;
    for _ in 0..200 {
        let mut jtj = Matrix2::zeros();
        let mut jtr = Vector2::zeros();
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            if x <= 0.0 {
                continue;
            }
            let (a, b) = (params[0], params[1]);
            let q = x.powf(2.0 * b);
            let denom = (1.0 + a * q).powi(2);
            let jac = Vector2::new(-q / denom, -2.0 * a * q * x.ln() / denom);
            jtj += jac * jac.transpose();
            jtr += jac * (curve(a, b, x) - y);
        }

        let mut damped = jtj;
        damped[(0, 0)] += lambda * jtj[(0, 0)];
        damped[(1, 1)] += lambda * jtj[(1, 1)];
        let Some(inverse) = damped.try_inverse() else {
            break;
        };
        let candidate = params - inverse * jtr;
        let candidate_cost = cost(&candidate);
        if candidate_cost.is_finite() && candidate_cost < current {
            let improvement = current - candidate_cost;
            params = candidate;
            current = candidate_cost;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < 1e-14 {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }
    (params[0], params[1])
}

#[inline(always)]
fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Epoch-sampled stochastic gradient descent over the graph edges, moving both endpoints.
fn optimize_layout(embedding: &mut [f64], params: &UmapParams, graph: &[Edge], a: f64, b: f64, n_epochs: usize, rnd: &mut dyn RngCore) {
    let dim = params.n_components;
    let n = embedding.len() / dim;
    let max_weight = graph.iter().map(|e| e.weight).fold(0.0, f64::max);
    if max_weight <= 0.0 || n_epochs == 0 {
        return;
    }

    // Edges too weak to be sampled even once are dropped
    let edges: Vec<Edge> = graph.iter().copied()
        .filter(|e| e.weight >= max_weight / n_epochs as f64)
        .collect();
    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
    let epochs_per_negative_sample: Vec<f64> = epochs_per_sample.iter()
        .map(|eps| eps / params.negative_sample_rate.max(1) as f64)
        .collect();
    let mut epoch_of_next_sample = epochs_per_sample.clone();
    let mut epoch_of_next_negative_sample = epochs_per_negative_sample.clone();
    let gamma = params.repulsion_strength;

    for epoch in 0..n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
        let epoch = epoch as f64;

        for (e, edge) in edges.iter().enumerate() {
            if epoch_of_next_sample[e] > epoch {
                continue;
            }
            let (j, k) = (edge.head * dim, edge.tail * dim);

            let d2 = helpers::squared_distance(&embedding[j..j + dim], &embedding[k..k + dim]);
            let attraction = if d2 > 0.0 {
                -2.0 * a * b * d2.powf(b - 1.0) / (a * d2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dim {
                let grad = clip(attraction * (embedding[j + d] - embedding[k + d]));
                embedding[j + d] += grad * alpha;
                embedding[k + d] -= grad * alpha;
            }
            epoch_of_next_sample[e] += epochs_per_sample[e];

            let n_neg = ((epoch - epoch_of_next_negative_sample[e]) / epochs_per_negative_sample[e]).floor().max(0.0);
            for _ in 0..n_neg as usize {
                let other = rnd.gen_range(0..n);
                if other == edge.head {
                    continue;
                }
                let o = other * dim;
                let d2 = helpers::squared_distance(&embedding[j..j + dim], &embedding[o..o + dim]);
                let repulsion = if d2 > 0.0 {
                    2.0 * gamma * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dim {
                    // Coincident points get the full clipped push
                    let grad = if repulsion > 0.0 {
                        clip(repulsion * (embedding[j + d] - embedding[o + d]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[j + d] += grad * alpha;
                }
            }
            epoch_of_next_negative_sample[e] += n_neg * epochs_per_negative_sample[e];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing;
    use crate::reduction::{pca, NalgebraBackend};

    #[test]
    fn curve_parameters_for_default_settings() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert_approx_eq!(a, 1.577, 0.05);
        assert_approx_eq!(b, 0.895, 0.05);
    }

    #[test]
    fn smooth_knn_hits_target() {
        let knn = vec![vec![(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]];
        let (sigmas, rhos) = smooth_knn_dist(&knn, 5.0);
        assert_eq!(rhos[0], 1.0);
        let psum: f64 = knn[0].iter().map(|&(_, d)| (-(d - rhos[0]).max(0.0) / sigmas[0]).exp()).sum();
        assert_approx_eq!(psum, 5f64.log2(), 1e-4);
    }

    #[test]
    fn fuzzy_graph_is_symmetric() {
        let mut rnd = StdRng::seed_from_u64(8);
        let data: Vec<f64> = (0..40 * 3).map(|_| rnd.gen_range(0.0..1.0)).collect();
        let data = Matrix::new(data, 40, 3).unwrap();
        let knn = nearest_neighbors(&data, 5);
        assert!(knn.iter().enumerate().all(|(i, nb)| nb.len() == 5 && nb.iter().all(|&(j, _)| j != i)));
        assert!(knn.iter().all(|nb| nb.windows(2).all(|w| w[0].1 <= w[1].1)));

        let (sigmas, rhos) = smooth_knn_dist(&knn, 6.0);
        let graph = fuzzy_simplicial_set(&knn, &sigmas, &rhos);
        let lookup: BTreeMap<(usize, usize), f64> = graph.iter().map(|e| ((e.head, e.tail), e.weight)).collect();
        for e in &graph {
            assert!(e.weight > 0.0 && e.weight <= 1.0);
            assert_eq!(lookup.get(&(e.tail, e.head)), Some(&e.weight));
        }
    }

    #[test]
    fn degenerate_inputs() {
        let umap = Umap::default();
        let mut rnd = StdRng::seed_from_u64(0);
        let single = Matrix::new(vec![1.0, 2.0, 3.0], 1, 3).unwrap();
        let out = umap.embed(&single, &mut rnd).unwrap();
        assert_eq!((out.rows(), out.cols()), (1, 2));
        assert_eq!(out.as_slice(), &[0.0, 0.0]);

        // Identical rows must not produce NaNs
        let same = Matrix::new(vec![0.5; 20 * 2], 20, 2).unwrap();
        let out = Umap::new(UmapParams { n_epochs: Some(50), ..Default::default() }).embed(&same, &mut rnd).unwrap();
        assert!(out.as_slice().iter().all(|v| v.is_finite()));

        let bad = Umap::new(UmapParams { min_dist: 2.0, ..Default::default() });
        assert!(matches!(bad.embed(&same, &mut rnd), Err(Error::InvalidParameter { name: "min_dist", .. })));
    }

    #[test]
    fn coincident_points_are_pushed_apart() {
        let mut embedding = vec![0.25, -0.5, 0.25, -0.5];
        let graph = [Edge { head: 0, tail: 1, weight: 1.0 }];
        let params = UmapParams { n_components: 2, ..Default::default() };
        let (a, b) = find_ab_params(params.spread, params.min_dist);
        let mut rnd = StdRng::seed_from_u64(9);
        optimize_layout(&mut embedding, &params, &graph, a, b, 5, &mut rnd);

        assert!(embedding.iter().all(|v| v.is_finite()));
        assert!(helpers::squared_distance(&embedding[0..2], &embedding[2..4]) > 0.0, "still stacked: {embedding:?}");
    }

    #[test]
    fn separates_digit_like_clusters() {
        let mut rnd = StdRng::seed_from_u64(2024);
        let (data, labels) = testing::digit_like(10, 20, &mut rnd);
        assert_eq!((data.rows(), data.cols()), (200, 784));

        let reduced = pca(&NalgebraBackend, &data, 10).unwrap();
        let embedding = Umap::default().embed(&reduced, &mut rnd).unwrap();
        assert_eq!((embedding.rows(), embedding.cols()), (200, 2));
        assert!(embedding.as_slice().iter().all(|v| v.is_finite()));

        let (within, across) = testing::within_and_across(&embedding, &labels);
        assert!(within < across, "within: {within}, across: {across}");
    }
}
