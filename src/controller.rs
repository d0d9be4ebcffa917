//! Shared run/stop/progress state of a session.
//!
//! Every long-running job (k-means, elbow search, embedding, autoencoder training) claims the
//! [`TrainingController`] before it starts, publishes its progress into the [`TrainingState`] and polls
//! [`TrainingController::is_running`] after each unit of work. Stopping is cooperative: the in-flight
//! unit always completes, its result is kept.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Lifecycle of the job currently (or last) holding the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Progress snapshot, readable at any time from any thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub running: bool,
    pub phase: RunPhase,
    pub status_text: String,
    pub current_iteration: usize,
    pub max_iterations: usize,
    pub current_epoch: usize,
    pub max_epochs: usize,
}
impl Default for TrainingState {
    fn default() -> Self {
        Self {
            running: false,
            phase: RunPhase::Idle,
            status_text: "Ready".to_string(),
            current_iteration: 0,
            max_iterations: 20,
            current_epoch: 0,
            max_epochs: 5,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    claimed: AtomicBool,
    state: RwLock<TrainingState>,
}

/// Cheaply cloneable handle to the shared [`TrainingState`] of one session.
///
/// The `running` flag doubles as the cancellation flag: [`TrainingController::stop`] clears it and the
/// job holding the controller returns after its current step. Whether a job holds the controller is
/// tracked separately, so a stopped job that is still finishing its last step keeps others out.
#[derive(Clone, Debug, Default)]
pub struct TrainingController {
    shared: Arc<Shared>,
}
impl TrainingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TrainingState {
        self.shared.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.read().unwrap_or_else(PoisonError::into_inner).running
    }

    /// Whether a job currently holds the controller (even if it was asked to stop).
    pub fn is_claimed(&self) -> bool {
        self.shared.claimed.load(Ordering::Acquire)
    }

    /// Ask the running job to stop after its current unit of work.
    /// Returns `false` if nothing was running.
    pub fn stop(&self) -> bool {
        let mut was_running = false;
        self.update(|state| {
            was_running = state.running;
            if state.running {
                state.running = false;
                state.status_text = "Stopping...".to_string();
            }
        });
        if was_running {
            tracing::info!("stop requested");
        }
        was_running
    }

    pub fn update(&self, f: impl FnOnce(&mut TrainingState)) {
        let mut state = self.shared.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.update(|state| state.status_text = status);
    }

    /// Take the controller for one job.
    ///
    /// ## Errors
    /// [`Error::Busy`] if another job holds the controller.
    pub fn claim(&self, status: impl Into<String>) -> Result<RunGuard> {
        if self.shared.claimed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(Error::Busy(self.snapshot().status_text));
        }
        let status = status.into();
        self.update(|state| {
            state.running = true;
            state.phase = RunPhase::Running;
            state.status_text = status;
        });
        Ok(RunGuard { controller: self.clone(), finished: false })
    }
}

/// Proof of holding the controller. Releases it when finished or dropped, on every exit path.
#[derive(Debug)]
pub struct RunGuard {
    controller: TrainingController,
    finished: bool,
}
impl RunGuard {
    pub fn controller(&self) -> &TrainingController {
        &self.controller
    }

    /// End the job with the given phase and status text.
    pub fn finish(mut self, phase: RunPhase, status: impl Into<String>) {
        let status = status.into();
        self.controller.update(|state| {
            state.phase = phase;
            state.status_text = status;
        });
        self.finished = true;
    }
}
impl Drop for RunGuard {
    fn drop(&mut self) {
        let finished = self.finished;
        self.controller.update(|state| {
            state.running = false;
            if !finished {
                state.phase = RunPhase::Failed;
            }
        });
        self.controller.shared.claimed.store(false, Ordering::Release);
    }
}

/// Yield back to the host between two units of work. A zero delay only yields the thread.
pub(crate) fn pause(delay: Duration) {
    if delay.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(delay);
    }
}
