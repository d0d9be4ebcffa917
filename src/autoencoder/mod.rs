//! Epoch-wise training of a dense reconstruction autoencoder.

mod network;

pub use network::Autoencoder;

use crate::{controller, Error, Matrix, Result, TrainingController};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderConfig {
    /// Width of the code layer
    pub bottleneck: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Number of leading rows that are reconstructed after every epoch
    pub reconstruction_samples: usize,
}
impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self { bottleneck: 16, epochs: 5, learning_rate: 0.001, batch_size: 128, reconstruction_samples: 16 }
    }
}

/// Model that can be trained one epoch at a time.
pub trait TrainableModel {
    /// Train one epoch (shuffled mini-batches over all rows, input used as target) and return its loss.
    fn fit_epoch(&mut self, data: &Matrix<f64>, batch_size: usize, rnd: &mut dyn RngCore) -> Result<f64>;
    fn predict(&self, data: &Matrix<f64>) -> Result<Matrix<f64>>;
}

/// Builds untrained models for the [`AutoencoderTrainer`].
pub trait ModelBackend {
    type Model: TrainableModel;
    fn build(&self, input_dim: usize, bottleneck: usize, learning_rate: f64, rnd: &mut dyn RngCore) -> Result<Self::Model>;
}

/// Builds the candle-backed [`Autoencoder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseBackend;
impl ModelBackend for DenseBackend {
    type Model = Autoencoder;
    fn build(&self, input_dim: usize, bottleneck: usize, learning_rate: f64, rnd: &mut dyn RngCore) -> Result<Autoencoder> {
        Autoencoder::new(input_dim, bottleneck, learning_rate, rnd)
    }
}
impl TrainableModel for Autoencoder {
    fn fit_epoch(&mut self, data: &Matrix<f64>, batch_size: usize, rnd: &mut dyn RngCore) -> Result<f64> {
        Autoencoder::fit_epoch(self, data, batch_size, rnd)
    }
    fn predict(&self, data: &Matrix<f64>) -> Result<Matrix<f64>> {
        self.reconstruct(data)
    }
}

/// A few rows of the training data next to the model's current reconstruction of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionPair {
    pub original: Matrix<f64>,
    pub reconstructed: Matrix<f64>,
}

/// Published after every completed epoch.
#[derive(Clone, Copy, Debug)]
pub struct EpochReport<'a> {
    /// 1-based
    pub epoch: usize,
    pub max_epochs: usize,
    pub loss: f64,
    pub reconstruction: &'a ReconstructionPair,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// One loss per completed epoch
    pub loss_history: Vec<f64>,
    /// Reconstruction after the last completed epoch
    pub reconstruction: Option<ReconstructionPair>,
    pub cancelled: bool,
}
impl TrainingOutcome {
    pub fn epochs_completed(&self) -> usize {
        self.loss_history.len()
    }
}

/// Drives the epoch loop of an autoencoder training run.
///
/// The model only lives for the duration of [`AutoencoderTrainer::train`]; it is dropped on every exit
/// path, the last reconstruction and the loss history are kept in the [`TrainingOutcome`].
#[derive(Clone, Debug, Default)]
pub struct AutoencoderTrainer<B = DenseBackend> {
    backend: B,
    controller: Option<TrainingController>,
    step_delay: Duration,
}
impl AutoencoderTrainer {
    pub fn new() -> Self {
        Self::with_backend(DenseBackend)
    }
}
impl<B: ModelBackend> AutoencoderTrainer<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend, controller: None, step_delay: Duration::ZERO }
    }

    /// Controller whose stop-flag is checked before every epoch, and which receives the epoch progress.
    pub fn controller(mut self, controller: TrainingController) -> Self {
        self.controller = Some(controller); self
    }

    /// Pause after each epoch.
    pub fn step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay; self
    }

    fn keep_running(&self) -> bool {
        self.controller.as_ref().map_or(true, TrainingController::is_running)
    }

    /// Train a fresh model on **data** (input and target) for up to `config.epochs` epochs.
    ///
    /// ## Errors
    /// - [`Error::EmptyInput`] for a matrix without rows
    /// - [`Error::InvalidParameter`] for a zero batch size or an invalid model configuration
    /// - [`Error::Training`] if the loss diverges
    pub fn train(&self, data: &Matrix<f64>, config: &AutoencoderConfig, rnd: &mut dyn RngCore, mut on_epoch: impl FnMut(&EpochReport<'_>)) -> Result<TrainingOutcome> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if config.batch_size == 0 {
            return Err(Error::invalid("batch_size", "must be positive"));
        }

        let mut model = self.backend.build(data.cols(), config.bottleneck, config.learning_rate, rnd)?;
        let samples = data.select_rows(0..config.reconstruction_samples.min(data.rows()));
        let mut outcome = TrainingOutcome { loss_history: Vec::with_capacity(config.epochs), reconstruction: None, cancelled: false };
        if let Some(controller) = &self.controller {
            controller.update(|state| {
                state.current_epoch = 0;
                state.max_epochs = config.epochs;
            });
        }

        for epoch in 1..=config.epochs {
            if !self.keep_running() {
                tracing::info!(epoch, "autoencoder training stopped");
                outcome.cancelled = true;
                break;
            }
            if let Some(controller) = &self.controller {
                controller.update(|state| {
                    state.current_epoch = epoch;
                    state.status_text = format!("Epoch {epoch}/{}", config.epochs);
                });
            }

            let loss = model.fit_epoch(data, config.batch_size, rnd)?;
            if !loss.is_finite() {
                return Err(Error::Training(format!("loss diverged in epoch {epoch}")));
            }
            outcome.loss_history.push(loss);

            // Replacing the pair drops its predecessor
            let reconstructed = model.predict(&samples)?;
            let pair = outcome.reconstruction.insert(ReconstructionPair { original: samples.clone(), reconstructed });
            tracing::debug!(epoch, loss, "autoencoder epoch done");
            on_epoch(&EpochReport { epoch, max_epochs: config.epochs, loss, reconstruction: pair });

            controller::pause(self.step_delay);
        }
        Ok(outcome)
    }
}
