//! # unsupervised-lab - API documentation
//!
//! Engine behind an interactive explorer of unsupervised learning. It loads small tabular or image
//! datasets, derives a preprocessed working matrix and runs one of three models on it, while a host
//! (a UI, a CLI, a test) watches progress and may stop the run at any time.
//!
//! ## Models
//! - k-Means clustering (Lloyd, k-means++ seeding) with an elbow search over the cluster count, see [`KMeans`]
//! - 2-D embeddings via PCA or UMAP, see [`ReductionEngine`]
//! - A dense reconstruction autoencoder trained epoch by epoch, see [`AutoencoderTrainer`]
//!
//! ## Sessions
//! The engines can be used on their own. [`Session`] ties them together the way an interactive host
//! uses them: one dataset, one working matrix, the latest result of every model and one
//! [`TrainingController`] that allows at most one job at a time. Stopping is cooperative; a stopped job
//! keeps the result of its last completed iteration or epoch.
//!
//! ## Supported primitive types
//! The k-means engine is generic over [`Primitive`] ([`f32`], [`f64`]). Embeddings, autoencoder training
//! and sessions work on `f64`.
//!
//! ## Example
//! ```rust
//! use unsupervised_lab::*;
//!
//! let (sample_cnt, sample_dims, k, max_iter) = (2000, 20, 4, 20);
//!
//! // Generate some random data
//! let mut samples = vec![0.0f64;sample_cnt * sample_dims];
//! samples.iter_mut().for_each(|v| *v = rand::random());
//!
//! // Calculate kmeans, using kmean++ as initialization-method
//! let kmean = KMeans::new(Matrix::new(samples, sample_cnt, sample_dims).unwrap());
//! let result = kmean.kmeans_lloyd(k, max_iter, KMeans::init_kmeanplusplus, &KMeansConfig::default()).unwrap();
//!
//! println!("Centroids: {:?}", result.centroids);
//! println!("Cluster-Assignments: {:?}", result.assignments);
//! println!("Error: {}", result.distsum);
//! ```
//!
//! ## Example (session with progress events)
//! ```rust
//! use unsupervised_lab::*;
//!
//! let samples: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 3) as f64 * 5.0 + (i as f64) * 0.01, 1.0]).collect();
//! let dataset = Dataset::new("three blobs", Matrix::from_rows(&samples).unwrap())
//!     .with_labels((0..60).map(|i| i % 3).collect())
//!     .with_defaults(ModelKind::KMeans, Some(3));
//!
//! let mut session = Session::new(SessionConfig::build().seed(42).build().unwrap()).unwrap();
//! session.load_dataset(dataset).unwrap();
//! session.set_observer(|event| {
//!     if let SessionEvent::KMeansIteration { iteration, state } = event {
//!         println!("Iteration {} - Error: {:.4}", iteration, state.distsum);
//!     }
//! });
//!
//! assert_eq!(session.run_selected().unwrap(), RunOutcome::Completed);
//! session.reveal_ground_truth(true);
//! let evaluation = session.evaluation().unwrap().unwrap();
//! println!("Purity: {:.2}", evaluation.purity);
//! ```
//!
//! ## Short API-Overview / Description
//! Entry-point of the clustering engine is the [`KMeans`] struct. It is generic over the underlying primitive
//! type and takes over the sample [`Matrix`]. Calling a variant (e.g. [`KMeans::kmeans_lloyd`]) does not
//! mutate it; the state of a calculation lives in a [`KMeansState`], configured through a [`KMeansConfig`]
//! (random generator, progress callbacks, [`TrainingController`]).

#[macro_use] mod helpers;
mod memory;
mod api;
mod variants;
mod inits;
mod elbow;
mod error;
mod preprocess;
mod metrics;
mod reduction;
mod autoencoder;
mod controller;
mod session;

pub use api::{KMeansState, KMeansConfig, KMeansConfigBuilder, KMeans, InitDoneCallbackFn, IterationDoneCallbackFn};
pub use autoencoder::{Autoencoder, AutoencoderConfig, AutoencoderTrainer, DenseBackend, EpochReport, ModelBackend, ReconstructionPair, TrainableModel, TrainingOutcome};
pub use controller::{RunGuard, RunPhase, TrainingController, TrainingState};
pub use elbow::{ElbowPoint, ElbowProgress, ElbowSearch};
pub use error::{Error, Result};
pub use memory::{Matrix, Primitive};
pub use metrics::{evaluate, ClusterEvaluation};
pub use preprocess::{add_gaussian_noise, min_max_scale, preprocess, PreprocessOptions};
pub use reduction::{find_ab_params, pca, EmbeddingBackend, EmbeddingMethod, LinalgBackend, NalgebraBackend, ReductionConfig, ReductionEngine, ThinSvd, Umap, UmapParams, EMBEDDING_DIMS};
pub use session::{
    Dataset, ModelKind, RunOutcome, Session, SessionConfig, SessionConfigBuilder, SessionEvent,
    BOTTLENECK_RANGE, EPOCHS_RANGE, KMEANS_MAX_ITERATIONS, K_RANGE, LEARNING_RATE_RANGE, NOISE_LEVEL_RANGE, PCA_COMPONENTS_RANGE,
};
