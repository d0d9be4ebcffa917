use super::EmbeddingMethod;
use crate::{Error, Matrix, Result};
use nalgebra::{DMatrix, SVD};
use rand::RngCore;
use std::cmp::Ordering;

/// Thin singular value decomposition `A = U·diag(s)·Vᵀ` of an `n x d` matrix, truncated to
/// `r = min(n, d)` components and ordered by descending singular value.
#[derive(Clone, Debug, PartialEq)]
pub struct ThinSvd {
    /// `n x r` left-singular vectors (one per column)
    pub u: Matrix<f64>,
    /// `r` singular values, descending
    pub singular_values: Vec<f64>,
}

/// Linear algebra needed by PCA.
pub trait LinalgBackend {
    fn column_means(&self, data: &Matrix<f64>) -> Vec<f64>;

    /// ## Errors
    /// [`Error::Reduction`] on non-finite input or if the decomposition does not converge.
    fn thin_svd(&self, data: &Matrix<f64>) -> Result<ThinSvd>;
}

/// Non-linear manifold projection of a (small-dimensional) data matrix into an embedding.
pub trait EmbeddingBackend {
    /// Embed every row of **data**; the result has exactly `data.rows()` rows.
    fn embed(&self, data: &Matrix<f64>, rnd: &mut dyn RngCore) -> Result<Matrix<f64>>;
}

/// [`LinalgBackend`] on top of `nalgebra`'s dense matrices.
#[derive(Clone, Copy, Debug, Default)]
pub struct NalgebraBackend;

const SVD_MAX_ITERATIONS: usize = 10_000;

fn svd_failure(reason: impl Into<String>) -> Error {
    Error::Reduction { method: EmbeddingMethod::Pca, reason: reason.into() }
}

impl LinalgBackend for NalgebraBackend {
    fn column_means(&self, data: &Matrix<f64>) -> Vec<f64> {
        let mut sums = vec![0.0; data.cols()];
        data.iter_rows().for_each(|row| {
            sums.iter_mut().zip(row.iter()).for_each(|(s, v)| *s += v);
        });
        let n = data.rows().max(1) as f64;
        sums.into_iter().map(|s| s / n).collect()
    }

    fn thin_svd(&self, data: &Matrix<f64>) -> Result<ThinSvd> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if data.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(svd_failure("input contains non-finite values"));
        }
        let (rows, cols) = (data.rows(), data.cols());
        let dense = DMatrix::from_row_slice(rows, cols, data.as_slice());
        let svd = SVD::try_new(dense, true, false, f64::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or_else(|| svd_failure(format!("SVD did not converge within {SVD_MAX_ITERATIONS} iterations")))?;
        let u = svd.u.ok_or_else(|| svd_failure("left-singular vectors were not computed"))?;

        // nalgebra does not guarantee any order of the singular values
        let s = &svd.singular_values;
        let mut order: Vec<usize> = (0..s.len()).collect();
        order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(Ordering::Equal));

        let u_sorted: Vec<f64> = (0..rows)
            .flat_map(|i| order.iter().map(|&j| u[(i, j)]).collect::<Vec<_>>())
            .collect();
        Ok(ThinSvd {
            u: Matrix::new(u_sorted, rows, order.len())?,
            singular_values: order.iter().map(|&j| s[j]).collect(),
        })
    }
}
