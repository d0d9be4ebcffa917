use super::backend::LinalgBackend;
use crate::{Error, Matrix, Result};

/// Project **data** onto its first **num_components** principal components.
///
/// The data is centered column-wise, decomposed as `U·S·Vᵀ` and the scores `U·S` are returned, one row
/// per sample. The result is deterministic, but the sign of each component depends on the backend.
/// Asking for more components than `min(rows, cols)` yields only the available ones.
///
/// ## Errors
/// - [`Error::EmptyInput`] for a matrix without rows
/// - [`Error::InvalidParameter`] for zero components
/// - [`Error::Reduction`] if the decomposition fails
#[tracing::instrument(level = "debug", skip(backend, data), fields(rows = data.rows(), cols = data.cols()))]
pub fn pca<L: LinalgBackend>(backend: &L, data: &Matrix<f64>, num_components: usize) -> Result<Matrix<f64>> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    if num_components == 0 {
        return Err(Error::invalid("pca_components", "at least one component is required"));
    }

    let means = backend.column_means(data);
    let mut centered = data.clone();
    centered.data_mut().chunks_exact_mut(data.cols()).for_each(|row| {
        row.iter_mut().zip(means.iter()).for_each(|(v, m)| *v -= m);
    });

    let svd = backend.thin_svd(&centered)?;
    let available = svd.singular_values.len();
    let components = num_components.min(available);
    if components < num_components {
        tracing::warn!(requested = num_components, available, "fewer principal components available than requested");
    }

    let scores: Vec<f64> = svd.u.iter_rows()
        .flat_map(|u_row| {
            u_row.iter().zip(svd.singular_values.iter())
                .take(components)
                .map(|(u, s)| u * s)
        })
        .collect();
    Matrix::new(scores, data.rows(), components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{squared_distance, testing};
    use crate::reduction::NalgebraBackend;
    use rand::prelude::*;

    #[test]
    fn output_shape() {
        let mut rnd = StdRng::seed_from_u64(4);
        let data: Vec<f64> = (0..60 * 7).map(|_| rnd.gen_range(0.0..1.0)).collect();
        let data = Matrix::new(data, 60, 7).unwrap();
        assert_eq!(pca(&NalgebraBackend, &data, 2).unwrap().cols(), 2);
        assert_eq!(pca(&NalgebraBackend, &data, 5).unwrap().rows(), 60);
        // More components than columns
        assert_eq!(pca(&NalgebraBackend, &data, 10).unwrap().cols(), 7);
        // More components than rows
        let few = data.select_rows(0..3);
        assert_eq!(pca(&NalgebraBackend, &few, 5).unwrap().cols(), 3);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let data = testing::iris_petals();
        let first = pca(&NalgebraBackend, &data, 2).unwrap();
        let second = pca(&NalgebraBackend, &data, 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn full_rank_projection_preserves_distances() {
        let data = testing::iris_petals();
        let scores = pca(&NalgebraBackend, &data, 2).unwrap();
        // Rotation of centered data: pairwise distances are unchanged
        for (i, j) in [(0, 1), (0, 149), (42, 99), (75, 120)] {
            assert_approx_eq!(
                squared_distance(data.row(i), data.row(j)),
                squared_distance(scores.row(i), scores.row(j)),
                1e-9
            );
        }
        // First component carries the most variance
        let var = |c: usize| scores.iter_rows().map(|r| r[c] * r[c]).sum::<f64>();
        assert!(var(0) > var(1));
    }

    #[test]
    fn scores_are_centered() {
        let data = Matrix::from_rows(&[vec![1.0, 5.0, 2.0], vec![2.0, 7.0, 1.0], vec![4.0, 1.0, 0.0], vec![3.0, 3.0, 9.0]]).unwrap();
        let scores = pca(&NalgebraBackend, &data, 2).unwrap();
        for c in 0..2 {
            let mean: f64 = scores.iter_rows().map(|r| r[c]).sum::<f64>() / 4.0;
            assert_approx_eq!(mean, 0.0, 1e-9);
        }
    }

    #[test]
    fn invalid_input() {
        let empty = Matrix::<f64>::new(vec![], 0, 3).unwrap();
        assert_eq!(pca(&NalgebraBackend, &empty, 2), Err(Error::EmptyInput));
        assert!(pca(&NalgebraBackend, &testing::iris_petals(), 0).is_err());
    }
}
