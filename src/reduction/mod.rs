//! Dimensionality reduction: PCA projections and UMAP embeddings into two dimensions.

mod backend;
mod pca;
mod umap;

pub use backend::{EmbeddingBackend, LinalgBackend, NalgebraBackend, ThinSvd};
pub use pca::pca;
pub use umap::{find_ab_params, Umap, UmapParams};

use crate::{Error, Matrix, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of dimensions of every embedding shown to the user.
pub const EMBEDDING_DIMS: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingMethod {
    #[serde(alias = "PCA", alias = "pca")]
    Pca,
    #[default]
    #[serde(alias = "UMAP", alias = "umap")]
    Umap,
}
impl fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmbeddingMethod::Pca => "PCA",
            EmbeddingMethod::Umap => "UMAP",
        })
    }
}

/// Which embedding to compute, and how.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub method: EmbeddingMethod,
    /// UMAP input is first projected onto this many principal components, if it has more columns
    pub pca_components: usize,
    pub umap: UmapParams,
}
impl Default for ReductionConfig {
    fn default() -> Self {
        Self { method: EmbeddingMethod::Umap, pca_components: 10, umap: UmapParams::default() }
    }
}

/// Runs PCA and UMAP on top of exchangeable linear algebra and embedding backends.
#[derive(Clone, Debug, Default)]
pub struct ReductionEngine<L = NalgebraBackend, E = Umap> {
    linalg: L,
    embedder: E,
}
impl ReductionEngine {
    /// Engine with the native backends and the given UMAP parameters.
    pub fn new(umap: UmapParams) -> Self {
        Self { linalg: NalgebraBackend, embedder: Umap::new(umap) }
    }
}
impl<L: LinalgBackend, E: EmbeddingBackend> ReductionEngine<L, E> {
    pub fn with_backends(linalg: L, embedder: E) -> Self {
        Self { linalg, embedder }
    }

    /// See [`pca()`].
    pub fn pca(&self, data: &Matrix<f64>, num_components: usize) -> Result<Matrix<f64>> {
        pca(&self.linalg, data, num_components)
    }

    /// Compute a 2-D embedding of **data** with the configured method. **on_stage** receives a status
    /// line whenever a new stage (PCA pre-reduction, UMAP) starts.
    ///
    /// ## Errors
    /// - [`Error::EmptyInput`] for a matrix without rows
    /// - [`Error::Reduction`] naming the failing method
    pub fn embed(&self, data: &Matrix<f64>, config: &ReductionConfig, rnd: &mut dyn RngCore, mut on_stage: impl FnMut(&str)) -> Result<Matrix<f64>> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let embedding = match config.method {
            EmbeddingMethod::Pca => {
                on_stage("Running PCA...");
                let scores = self.pca(data, EMBEDDING_DIMS)?;
                pad_columns(scores, EMBEDDING_DIMS)?
            }
            EmbeddingMethod::Umap => {
                let reduced;
                let input = if data.cols() > config.pca_components {
                    on_stage(&format!("Running PCA ({} comps)...", config.pca_components));
                    reduced = self.pca(data, config.pca_components)?;
                    &reduced
                } else {
                    data
                };
                on_stage("Running UMAP...");
                self.embedder.embed(input, rnd)?
            }
        };

        if embedding.rows() != data.rows() {
            return Err(Error::Reduction {
                method: config.method,
                reason: format!("embedding has {} rows, input has {}", embedding.rows(), data.rows()),
            });
        }
        if embedding.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(Error::Reduction { method: config.method, reason: "embedding contains non-finite values".to_string() });
        }
        Ok(embedding)
    }
}

/// Append zero columns up to **cols** (data with a single column has a single principal component).
fn pad_columns(m: Matrix<f64>, cols: usize) -> Result<Matrix<f64>> {
    if m.cols() >= cols {
        return Ok(m);
    }
    let rows = m.rows();
    let data: Vec<f64> = m.iter_rows()
        .flat_map(|row| row.iter().copied().chain(std::iter::repeat(0.0).take(cols - row.len())))
        .collect();
    Matrix::new(data, rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing;
    use rand::prelude::*;

    struct FailingEmbedder;
    impl EmbeddingBackend for FailingEmbedder {
        fn embed(&self, _: &Matrix<f64>, _: &mut dyn RngCore) -> Result<Matrix<f64>> {
            Err(Error::Reduction { method: EmbeddingMethod::Umap, reason: "diverged".to_string() })
        }
    }

    /// Returns the first two input columns, to observe what reaches the embedder.
    struct Passthrough;
    impl EmbeddingBackend for Passthrough {
        fn embed(&self, data: &Matrix<f64>, _: &mut dyn RngCore) -> Result<Matrix<f64>> {
            let cols: Vec<f64> = data.iter_rows().flat_map(|r| r[..2].to_vec()).collect();
            Matrix::new(cols, data.rows(), 2)
        }
    }

    #[test]
    fn pca_method_produces_two_columns() {
        let engine = ReductionEngine::new(UmapParams::default());
        let mut rnd = StdRng::seed_from_u64(0);
        let config = ReductionConfig { method: EmbeddingMethod::Pca, ..Default::default() };
        let mut stages = Vec::new();
        let out = engine.embed(&testing::iris_petals(), &config, &mut rnd, |s| stages.push(s.to_string())).unwrap();
        assert_eq!((out.rows(), out.cols()), (150, 2));
        assert_eq!(stages, vec!["Running PCA..."]);

        let single_column = Matrix::new(vec![1.0, 2.0, 4.0], 3, 1).unwrap();
        let out = engine.embed(&single_column, &config, &mut rnd, |_| {}).unwrap();
        assert_eq!(out.cols(), 2);
        assert!(out.iter_rows().all(|r| r[1] == 0.0));
    }

    #[test]
    fn umap_is_preceded_by_pca_for_wide_input() {
        let engine = ReductionEngine::with_backends(NalgebraBackend, Passthrough);
        let mut rnd = StdRng::seed_from_u64(0);
        let (data, _) = testing::digit_like(4, 5, &mut rnd);
        let config = ReductionConfig { pca_components: 3, ..Default::default() };
        let mut stages = Vec::new();
        let out = engine.embed(&data, &config, &mut rnd, |s| stages.push(s.to_string())).unwrap();
        assert_eq!(stages, vec!["Running PCA (3 comps)...", "Running UMAP..."]);
        assert_eq!(out, engine.pca(&data, 2).unwrap());

        // Narrow input goes to the embedder unchanged
        stages.clear();
        let narrow = testing::iris_petals();
        let out = engine.embed(&narrow, &config, &mut rnd, |s| stages.push(s.to_string())).unwrap();
        assert_eq!(stages, vec!["Running UMAP..."]);
        assert_eq!(out, narrow);
    }

    #[test]
    fn failures_name_the_method() {
        let engine = ReductionEngine::with_backends(NalgebraBackend, FailingEmbedder);
        let mut rnd = StdRng::seed_from_u64(0);
        let err = engine.embed(&testing::iris_petals(), &ReductionConfig::default(), &mut rnd, |_| {}).unwrap_err();
        assert_eq!(err.to_string(), "UMAP failed: diverged");

        let empty = Matrix::<f64>::new(vec![], 0, 2).unwrap();
        assert_eq!(engine.embed(&empty, &ReductionConfig::default(), &mut rnd, |_| {}), Err(Error::EmptyInput));
    }

    #[test]
    fn method_names() {
        assert_eq!(EmbeddingMethod::Pca.to_string(), "PCA");
        assert_eq!(EmbeddingMethod::Umap.to_string(), "UMAP");
        assert_eq!(EmbeddingMethod::default(), EmbeddingMethod::Umap);
    }
}
