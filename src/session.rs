//! Command surface of one interactive exploration session.
//!
//! A [`Session`] owns the loaded [`Dataset`], the working matrix derived from it, the latest result of
//! every model and the [`TrainingController`] that serializes all long-running jobs. Hosts drive it
//! through commands ([`Session::run`], [`Session::compute_elbow`], [`Session::stop`], ...) and watch it
//! through [`Session::state`] snapshots or an observer receiving [`SessionEvent`]s.

use crate::autoencoder::{AutoencoderConfig, AutoencoderTrainer, EpochReport, ReconstructionPair};
use crate::controller::{RunGuard, RunPhase, TrainingState};
use crate::elbow::{ElbowPoint, ElbowProgress, ElbowSearch};
use crate::reduction::{EmbeddingMethod, ReductionConfig, ReductionEngine, EMBEDDING_DIMS};
use crate::{metrics, preprocess, ClusterEvaluation, Error, KMeans, KMeansConfig, KMeansState, Matrix, PreprocessOptions, Result, TrainingController};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

/// Iteration budget of a k-means run. There is no convergence check.
pub const KMEANS_MAX_ITERATIONS: usize = 20;

pub const K_RANGE: RangeInclusive<usize> = 2..=15;
pub const NOISE_LEVEL_RANGE: RangeInclusive<f64> = 0.01..=0.5;
pub const PCA_COMPONENTS_RANGE: RangeInclusive<usize> = 2..=50;
pub const BOTTLENECK_RANGE: RangeInclusive<usize> = 2..=64;
pub const EPOCHS_RANGE: RangeInclusive<usize> = 1..=20;
pub const LEARNING_RATE_RANGE: RangeInclusive<f64> = 0.0001..=0.01;

/// The closed set of models a session can run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    KMeans,
    Embedding,
    Autoencoder,
}
impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::KMeans => "k-Means Clustering",
            ModelKind::Embedding => "Embedding (PCA/UMAP)",
            ModelKind::Autoencoder => "Autoencoder",
        })
    }
}

/// Everything the user can configure in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cluster count of k-means runs
    pub k: usize,
    #[serde(flatten)]
    pub preprocess: PreprocessOptions,
    #[serde(flatten)]
    pub reduction: ReductionConfig,
    /// Show a dataset's precomputed embedding instead of computing one
    pub use_precomputed_embedding: bool,
    pub autoencoder: AutoencoderConfig,
    /// Pause between iterations/epochs, for animation
    pub step_delay_ms: u64,
    /// Seed of the session's random generator; drawn from the OS when unset
    pub seed: Option<u64>,
}
impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            k: 3,
            preprocess: PreprocessOptions::default(),
            reduction: ReductionConfig::default(),
            use_precomputed_embedding: true,
            autoencoder: AutoencoderConfig::default(),
            step_delay_ms: 0,
            seed: None,
        }
    }
}

fn check_range<T: PartialOrd + fmt::Display>(name: &'static str, value: T, range: &RangeInclusive<T>) -> Result<()> {
    if !range.contains(&value) {
        return Err(Error::invalid(name, format!("{value} is outside of [{}, {}]", range.start(), range.end())));
    }
    Ok(())
}

impl SessionConfig {
    /// Use the [`SessionConfigBuilder`] to build a validated [`SessionConfig`].
    pub fn build() -> SessionConfigBuilder {
        SessionConfigBuilder { config: SessionConfig::default() }
    }

    /// ## Errors
    /// [`Error::InvalidParameter`] naming the first value outside of its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_range("k", self.k, &K_RANGE)?;
        check_range("noise_level", self.preprocess.noise_level, &NOISE_LEVEL_RANGE)?;
        check_range("pca_components", self.reduction.pca_components, &PCA_COMPONENTS_RANGE)?;
        check_range("bottleneck", self.autoencoder.bottleneck, &BOTTLENECK_RANGE)?;
        check_range("epochs", self.autoencoder.epochs, &EPOCHS_RANGE)?;
        check_range("learning_rate", self.autoencoder.learning_rate, &LEARNING_RATE_RANGE)?;
        if self.autoencoder.batch_size == 0 {
            return Err(Error::invalid("batch_size", "must be positive"));
        }
        Ok(())
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}
impl SessionConfigBuilder {
    pub fn k(mut self, k: usize) -> Self {
        self.config.k = k; self
    }
    pub fn scale(mut self, scale: bool) -> Self {
        self.config.preprocess.scale = scale; self
    }
    pub fn add_noise(mut self, add_noise: bool) -> Self {
        self.config.preprocess.add_noise = add_noise; self
    }
    pub fn noise_level(mut self, noise_level: f64) -> Self {
        self.config.preprocess.noise_level = noise_level; self
    }
    pub fn embedding_method(mut self, method: EmbeddingMethod) -> Self {
        self.config.reduction.method = method; self
    }
    pub fn pca_components(mut self, pca_components: usize) -> Self {
        self.config.reduction.pca_components = pca_components; self
    }
    pub fn use_precomputed_embedding(mut self, enabled: bool) -> Self {
        self.config.use_precomputed_embedding = enabled; self
    }
    pub fn bottleneck(mut self, bottleneck: usize) -> Self {
        self.config.autoencoder.bottleneck = bottleneck; self
    }
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.autoencoder.epochs = epochs; self
    }
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.autoencoder.learning_rate = learning_rate; self
    }
    pub fn step_delay(mut self, step_delay: Duration) -> Self {
        self.config.step_delay_ms = step_delay.as_millis().try_into().unwrap_or(u64::MAX); self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed); self
    }
    /// Validate and return the configuration.
    pub fn build(self) -> Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Raw data as delivered by a dataset loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub samples: Matrix<f64>,
    /// Ground-truth class per row
    pub labels: Option<Vec<usize>>,
    /// Ready-made 2-D embedding, one row per sample
    pub precomputed_embedding: Option<Matrix<f64>>,
    /// Model selected when the dataset is loaded
    pub default_model: Option<ModelKind>,
    /// Cluster count set when the dataset is loaded
    pub default_k: Option<usize>,
}
impl Dataset {
    pub fn new(name: impl Into<String>, samples: Matrix<f64>) -> Self {
        Self { name: name.into(), samples, labels: None, precomputed_embedding: None, default_model: None, default_k: None }
    }
    pub fn with_labels(mut self, labels: Vec<usize>) -> Self {
        self.labels = Some(labels); self
    }
    pub fn with_precomputed_embedding(mut self, embedding: Matrix<f64>) -> Self {
        self.precomputed_embedding = Some(embedding); self
    }
    pub fn with_defaults(mut self, model: ModelKind, k: Option<usize>) -> Self {
        self.default_model = Some(model);
        self.default_k = k;
        self
    }

    fn validate(&self) -> Result<()> {
        let rows = self.samples.rows();
        if let Some(labels) = &self.labels {
            if labels.len() != rows {
                return Err(Error::ShapeMismatch { expected: format!("{rows} labels"), actual: format!("{} labels", labels.len()) });
            }
        }
        if let Some(embedding) = &self.precomputed_embedding {
            if embedding.rows() != rows || embedding.cols() != EMBEDDING_DIMS {
                return Err(Error::ShapeMismatch {
                    expected: format!("{rows}x{EMBEDDING_DIMS} embedding"),
                    actual: format!("{}x{}", embedding.rows(), embedding.cols()),
                });
            }
        }
        if let Some(k) = self.default_k {
            check_range("k", k, &K_RANGE)?;
        }
        Ok(())
    }
}

/// Progress published to the session observer while a job runs.
#[derive(Clone, Copy, Debug)]
pub enum SessionEvent<'a> {
    /// Centroids were seeded, no iteration has run yet
    KMeansSeeded(&'a KMeansState<f64>),
    KMeansIteration { iteration: usize, state: &'a KMeansState<f64> },
    ElbowPoint(&'a ElbowPoint<f64>),
    EmbeddingReady(&'a Matrix<f64>),
    EpochFinished(&'a EpochReport<'a>),
}

/// How a command ended. Failures of the computation itself are reported here (and in the status text),
/// not as `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// No working matrix loaded, nothing happened
    NoData,
    Completed,
    /// Stopped on request; the last completed step's result is kept
    Stopped,
    Failed(Error),
}

type Observer = Box<dyn Fn(&SessionEvent<'_>) + Send>;

/// One exploration session. See the [module docs](self).
pub struct Session {
    config: SessionConfig,
    controller: TrainingController,
    rnd: StdRng,
    dataset: Option<Dataset>,
    working: Option<Arc<Matrix<f64>>>,
    selected_model: ModelKind,
    ground_truth_revealed: bool,
    kmeans: Option<KMeansState<f64>>,
    elbow: Vec<ElbowPoint<f64>>,
    embedding: Option<Matrix<f64>>,
    loss_history: Vec<f64>,
    reconstruction: Option<ReconstructionPair>,
    observer: Option<Observer>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.controller.snapshot())
            .field("dataset", &self.dataset.as_ref().map(|d| &d.name))
            .field("selected_model", &self.selected_model)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// ## Errors
    /// [`Error::InvalidParameter`] if the configuration is out of range.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_controller(config, TrainingController::new())
    }

    /// Session reporting to (and serialized by) an existing controller.
    pub fn with_controller(config: SessionConfig, controller: TrainingController) -> Result<Self> {
        config.validate()?;
        let rnd = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            controller,
            rnd,
            dataset: None,
            working: None,
            selected_model: ModelKind::default(),
            ground_truth_revealed: false,
            kmeans: None,
            elbow: Vec::new(),
            embedding: None,
            loss_history: Vec::new(),
            reconstruction: None,
            observer: None,
        })
    }

    pub fn config(&self) -> &SessionConfig { &self.config }

    /// Replace the configuration. The working matrix is only re-derived by [`Session::apply_preprocessing`].
    pub fn set_config(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn controller(&self) -> &TrainingController { &self.controller }

    pub fn state(&self) -> TrainingState { self.controller.snapshot() }

    pub fn set_observer(&mut self, observer: impl Fn(&SessionEvent<'_>) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    fn notify(&self, event: SessionEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Independent generator for one job.
    fn child_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rnd.gen())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.controller.is_claimed() {
            return Err(Error::Busy(self.controller.snapshot().status_text));
        }
        Ok(())
    }

    /// Load a dataset: all previous results are discarded, the ground truth is hidden again, the
    /// dataset's defaults are applied and the working matrix is derived.
    ///
    /// ## Errors
    /// - [`Error::Busy`] while a job runs
    /// - [`Error::ShapeMismatch`] if labels or precomputed embedding do not match the samples
    pub fn load_dataset(&mut self, dataset: Dataset) -> Result<()> {
        self.ensure_idle()?;
        dataset.validate()?;
        self.controller.set_status(format!("Loading {}...", dataset.name));
        tracing::info!(name = %dataset.name, rows = dataset.samples.rows(), cols = dataset.samples.cols(), "loading dataset");

        self.kmeans = None;
        self.elbow.clear();
        self.embedding = None;
        self.loss_history.clear();
        self.reconstruction = None;
        self.ground_truth_revealed = false;
        if let Some(model) = dataset.default_model {
            self.selected_model = model;
        }
        if let Some(k) = dataset.default_k {
            self.config.k = k;
        }
        self.dataset = Some(dataset);
        self.apply_preprocessing()?;
        self.controller.set_status("Ready");
        Ok(())
    }

    pub fn dataset(&self) -> Option<&Dataset> { self.dataset.as_ref() }

    /// Re-derive the working matrix from the loaded dataset with the current preprocessing options.
    /// Without a dataset this does nothing.
    pub fn apply_preprocessing(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let mut rnd = self.child_rng();
        let Some(dataset) = &self.dataset else {
            return Ok(());
        };
        let working = preprocess(&dataset.samples, &self.config.preprocess, &mut rnd)?;
        tracing::debug!(rows = working.rows(), cols = working.cols(), "working matrix derived");
        self.working = Some(Arc::new(working));
        Ok(())
    }

    pub fn working_matrix(&self) -> Option<&Matrix<f64>> { self.working.as_deref() }

    pub fn select_model(&mut self, model: ModelKind) { self.selected_model = model; }
    pub fn selected_model(&self) -> ModelKind { self.selected_model }

    /// Ask the running job to stop after its current step. Returns `false` if nothing was running.
    pub fn stop(&self) -> bool { self.controller.stop() }

    pub fn reveal_ground_truth(&mut self, revealed: bool) { self.ground_truth_revealed = revealed; }

    /// Labels of the loaded dataset, once revealed.
    pub fn ground_truth(&self) -> Option<&[usize]> {
        if !self.ground_truth_revealed {
            return None;
        }
        self.dataset.as_ref()?.labels.as_deref()
    }

    /// Purity and confusion matrix of the latest k-means assignments against the revealed labels.
    pub fn evaluation(&self) -> Result<Option<ClusterEvaluation>> {
        match (self.ground_truth(), &self.kmeans) {
            (Some(labels), Some(state)) => metrics::evaluate(&state.assignments, labels).map(Some),
            _ => Ok(None),
        }
    }

    pub fn kmeans_result(&self) -> Option<&KMeansState<f64>> { self.kmeans.as_ref() }
    pub fn elbow_curve(&self) -> &[ElbowPoint<f64>] { &self.elbow }
    pub fn embedding(&self) -> Option<&Matrix<f64>> { self.embedding.as_ref() }
    pub fn loss_history(&self) -> &[f64] { &self.loss_history }
    pub fn reconstruction(&self) -> Option<&ReconstructionPair> { self.reconstruction.as_ref() }

    /// Run the currently selected model.
    pub fn run_selected(&mut self) -> Result<RunOutcome> {
        self.run(self.selected_model)
    }

    /// Select **model** and run it on the working matrix.
    ///
    /// ## Errors
    /// [`Error::Busy`] if another job holds the controller. Every other failure ends the run with
    /// [`RunOutcome::Failed`].
    pub fn run(&mut self, model: ModelKind) -> Result<RunOutcome> {
        self.selected_model = model;
        let Some(data) = self.working.clone() else {
            tracing::debug!(%model, "no working matrix, nothing to run");
            return Ok(RunOutcome::NoData);
        };
        tracing::info!(%model, rows = data.rows(), cols = data.cols(), "run started");
        match model {
            ModelKind::KMeans => self.run_kmeans(&data),
            ModelKind::Embedding => self.run_embedding(&data),
            ModelKind::Autoencoder => self.run_autoencoder(&data),
        }
    }

    fn fail(guard: RunGuard, status: String, err: Error) -> RunOutcome {
        tracing::warn!(%err, "{status}");
        guard.finish(RunPhase::Failed, format!("{status}: {err}"));
        RunOutcome::Failed(err)
    }

    fn run_kmeans(&mut self, data: &Matrix<f64>) -> Result<RunOutcome> {
        let guard = self.controller.claim("Initializing k-means...")?;
        self.kmeans = None;
        let rnd = self.child_rng();
        let controller = guard.controller().clone();
        controller.update(|state| {
            state.current_iteration = 0;
            state.max_iterations = KMEANS_MAX_ITERATIONS;
        });

        let result = {
            let observer = self.observer.as_deref();
            let init_done = |state: &KMeansState<f64>| {
                if let Some(observer) = observer {
                    observer(&SessionEvent::KMeansSeeded(state));
                }
            };
            let iteration_done = |state: &KMeansState<f64>, iteration: usize| {
                controller.update(|s| {
                    s.current_iteration = iteration;
                    s.status_text = format!("Iteration {iteration}/{KMEANS_MAX_ITERATIONS}");
                });
                if let Some(observer) = observer {
                    observer(&SessionEvent::KMeansIteration { iteration, state });
                }
            };
            let conf = KMeansConfig::build()
                .random_generator(rnd)
                .controller(controller.clone())
                .step_delay(self.config.step_delay())
                .init_done(&init_done)
                .iteration_done(&iteration_done)
                .build();
            let kmean = KMeans::new(data.clone());
            kmean.kmeans_lloyd(self.config.k, KMEANS_MAX_ITERATIONS, KMeans::init_kmeanplusplus, &conf)
        };

        Ok(match result {
            Ok(state) if state.iterations == 0 => {
                // Seeding alone is no clustering result
                guard.finish(RunPhase::Stopped, "k-means stopped");
                tracing::info!("k-means stopped before the first iteration");
                RunOutcome::Stopped
            }
            Ok(state) => {
                let outcome = if state.iterations < KMEANS_MAX_ITERATIONS {
                    guard.finish(RunPhase::Stopped, "k-means stopped");
                    RunOutcome::Stopped
                } else {
                    guard.finish(RunPhase::Completed, "k-means finished");
                    RunOutcome::Completed
                };
                tracing::info!(iterations = state.iterations, sse = state.distsum, "k-means done");
                self.kmeans = Some(state);
                outcome
            }
            Err(err) => Self::fail(guard, "k-means failed".to_string(), err),
        })
    }

    /// Search the elbow curve over `k = 2..=10` on the working matrix.
    ///
    /// ## Errors
    /// [`Error::Busy`] if another job holds the controller.
    pub fn compute_elbow(&mut self) -> Result<RunOutcome> {
        let Some(data) = self.working.clone() else {
            return Ok(RunOutcome::NoData);
        };
        let guard = self.controller.claim("Calculating Elbow Plot...")?;
        self.elbow.clear();
        let rnd = self.child_rng();
        let controller = guard.controller().clone();
        let conf = KMeansConfig::build()
            .random_generator(rnd)
            .controller(controller.clone())
            .step_delay(self.config.step_delay())
            .build();

        let search = ElbowSearch::default();
        let expected = (search.min_k..=search.max_k).filter(|&k| k <= data.rows()).count();
        let curve = {
            let kmean = KMeans::new((*data).clone());
            let observer = self.observer.as_deref();
            let on_progress = |progress: ElbowProgress<'_, f64>| match progress {
                ElbowProgress::Started { k } => controller.set_status(format!("Testing k={k}...")),
                ElbowProgress::Finished(point) => {
                    if let Some(observer) = observer {
                        observer(&SessionEvent::ElbowPoint(point));
                    }
                }
            };
            search.run(&kmean, &conf, on_progress)
        };

        let outcome = if curve.len() < expected {
            guard.finish(RunPhase::Stopped, "Elbow plot stopped");
            RunOutcome::Stopped
        } else {
            guard.finish(RunPhase::Completed, "Elbow plot ready");
            RunOutcome::Completed
        };
        self.elbow = curve;
        Ok(outcome)
    }

    fn run_embedding(&mut self, data: &Matrix<f64>) -> Result<RunOutcome> {
        let precomputed = self.dataset.as_ref()
            .filter(|_| self.config.use_precomputed_embedding)
            .and_then(|d| d.precomputed_embedding.clone());
        if let Some(embedding) = precomputed {
            let guard = self.controller.claim("Loading precomputed UMAP...")?;
            self.notify(SessionEvent::EmbeddingReady(&embedding));
            self.embedding = Some(embedding);
            guard.finish(RunPhase::Completed, "Embedding ready");
            return Ok(RunOutcome::Completed);
        }

        let method = self.config.reduction.method;
        let guard = self.controller.claim(format!("Running {method}..."))?;
        let mut rnd = self.child_rng();
        let controller = guard.controller().clone();
        let engine = ReductionEngine::new(self.config.reduction.umap.clone());

        Ok(match engine.embed(data, &self.config.reduction, &mut rnd, |stage| controller.set_status(stage)) {
            Ok(embedding) => {
                self.notify(SessionEvent::EmbeddingReady(&embedding));
                self.embedding = Some(embedding);
                guard.finish(RunPhase::Completed, "Embedding ready");
                RunOutcome::Completed
            }
            // The previous embedding stays in place
            Err(err) => Self::fail(guard, format!("Error during {method}"), err),
        })
    }

    fn run_autoencoder(&mut self, data: &Matrix<f64>) -> Result<RunOutcome> {
        let guard = self.controller.claim("Building model...")?;
        self.loss_history.clear();
        self.reconstruction = None;
        let mut rnd = self.child_rng();
        let trainer = AutoencoderTrainer::new()
            .controller(guard.controller().clone())
            .step_delay(self.config.step_delay());

        let observer = self.observer.as_deref();
        let result = trainer.train(data, &self.config.autoencoder, &mut rnd, |report| {
            if let Some(observer) = observer {
                observer(&SessionEvent::EpochFinished(report));
            }
        });

        Ok(match result {
            Ok(outcome) => {
                let run_outcome = if outcome.cancelled {
                    guard.finish(RunPhase::Stopped, "Autoencoder training stopped");
                    RunOutcome::Stopped
                } else {
                    guard.finish(RunPhase::Completed, "Autoencoder training finished");
                    RunOutcome::Completed
                };
                self.loss_history = outcome.loss_history;
                self.reconstruction = outcome.reconstruction;
                run_outcome
            }
            Err(err) => Self::fail(guard, "Autoencoder training failed".to_string(), err),
        })
    }
}
