use crate::{helpers, memory::*, TrainingController, Error, Result};
use std::{cell::RefCell, cmp::Ordering, time::Duration};
use rayon::prelude::*;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

pub type InitDoneCallbackFn<'a, T> = &'a dyn Fn(&KMeansState<T>);
pub type IterationDoneCallbackFn<'a, T> = &'a dyn Fn(&KMeansState<T>, usize);

/// This is a structure holding various configuration options for the a k-means calculations, such as
/// the random number generator to use, or a couple of callbacks, that can be set to get status information from
/// a running k-means calculation.
///
/// For a more detailed information about all possible options, have a look at [`KMeansConfigBuilder`].
pub struct KMeansConfig<'a, T: Primitive> {
    /// Callback that is called, when the initialization phase finished
    /// ## Arguments
    /// - **state**: Current [`KMeansState`] after the initialization
    pub(crate) init_done: InitDoneCallbackFn<'a, T>,
    /// Callback that is called after each completed iteration
    /// ## Arguments
    /// - **state**: Current [`KMeansState`] after the iteration
    /// - **iteration_id**: Number of the completed iteration (1-based)
    pub(crate) iteration_done: IterationDoneCallbackFn<'a, T>,
    /// Random number generator to use
    pub(crate) rnd: Box<RefCell<dyn RngCore>>,
    /// Cooperative cancellation. The calculation stops after the current iteration, once the controller is stopped.
    pub(crate) controller: Option<TrainingController>,
    /// Pause between two iterations, to keep an interactive host responsive
    pub(crate) step_delay: Duration,
}
impl<'a, T: Primitive> Default for KMeansConfig<'a, T> {
    fn default() -> Self {
        Self {
            init_done: &|_| {},
            iteration_done: &|_, _| {},
            rnd: Box::new(RefCell::new(rand::thread_rng())),
            controller: None,
            step_delay: Duration::ZERO,
        }
    }
}
impl<'a, T: Primitive> KMeansConfig<'a, T> {
    /// Use the [`KMeansConfigBuilder`] to build a [`KMeansConfig`] instance.
    pub fn build() -> KMeansConfigBuilder<'a, T> {
        KMeansConfigBuilder { config: KMeansConfig::default() }
    }

    /// Whether the calculation may continue with another unit of work.
    pub(crate) fn keep_running(&self) -> bool {
        self.controller.as_ref().map_or(true, TrainingController::is_running)
    }

    /// Yield back to the host between two units of work.
    pub(crate) fn pause(&self) {
        crate::controller::pause(self.step_delay);
    }
}
impl<'a, T: Primitive> std::fmt::Debug for KMeansConfig<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KMeansConfig")
            .field("controller", &self.controller)
            .field("step_delay", &self.step_delay)
            .finish_non_exhaustive()
    }
}

pub struct KMeansConfigBuilder<'a, T: Primitive> {
    config: KMeansConfig<'a, T>
}
impl<'a, T: Primitive> KMeansConfigBuilder<'a, T> {
    /// Set the callback that should be called after the centroid initialization, before the iteration starts.
    pub fn init_done(mut self, init_done: InitDoneCallbackFn<'a, T>) -> Self {
        self.config.init_done = init_done; self
    }
    /// Set the callback that should be called after each iteration during a running k-means calculation.
    pub fn iteration_done(mut self, iteration_done: IterationDoneCallbackFn<'a, T>) -> Self {
        self.config.iteration_done = iteration_done; self
    }
    /// Set the random number generator that should be used in the k-means calculation.
    /// Use a seeded generator for deterministically repeatable results.
    pub fn random_generator<R: RngCore + 'static>(mut self, rnd: R) -> Self {
        self.config.rnd = Box::new(RefCell::new(rnd)); self
    }
    /// Set the controller whose stop-flag is checked after each unit of work.
    /// ## Default
    /// None (the calculation always runs to its iteration cap)
    pub fn controller(mut self, controller: TrainingController) -> Self {
        self.config.controller = Some(controller); self
    }
    /// Set the pause between two iterations. This is purely cosmetic (animation) and has no influence
    /// on the result.
    /// ## Default
    /// [`Duration::ZERO`] (only yields the thread)
    pub fn step_delay(mut self, step_delay: Duration) -> Self {
        self.config.step_delay = step_delay; self
    }
    /// Return the internally built configuration structure.
    pub fn build(self) -> KMeansConfig<'a, T> { self.config }
}


/// This is the internally used data-structure, storing the current state during calculation, as
/// well as the final result, as returned by the API.
/// All mutations are done in this structure, making [`KMeans`] immutable.
///
/// ## Generics
/// - **T**: Underlying primitive type that was used for the calculation
///
/// ## Fields
/// - **k**: The amount of clusters that were requested when calculating this k-means result
/// - **distsum**: The total sum of (squared) distances from all samples to their respective centroids (SSE)
/// - **centroids**: Calculated cluster centers [row-major] = [<centroid0>,<centroid1>,<centroid2>,...]
/// - **centroid_frequency**: Amount of samples in each centroid
/// - **assignments**: Vector mapping each sample to its respective nearest cluster
/// - **centroid_distances**: Vector containing each sample's (squared) distance to its centroid
/// - **iterations**: Amount of completed iterations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansState<T> {
    pub k: usize,
    pub distsum: T,
    pub centroids: Vec<T>,
    pub centroid_frequency: Vec<usize>,
    pub assignments: Vec<usize>,
    pub centroid_distances: Vec<T>,
    pub iterations: usize,
    pub sample_dims: usize,
}
impl<T: Primitive> KMeansState<T> {
    pub(crate) fn new(sample_cnt: usize, sample_dims: usize, k: usize) -> Self {
        Self {
            k,
            distsum: T::zero(),
            centroids: vec![T::zero(); sample_dims * k],
            centroid_frequency: vec![0usize; k],
            assignments: vec![0usize; sample_cnt],
            centroid_distances: vec![T::infinity(); sample_cnt],
            iterations: 0,
            sample_dims,
        }
    }
    pub(crate) fn set_centroid_from_iter(&mut self, idx: usize, src: impl Iterator<Item = T>) {
        self.centroids.iter_mut().skip(self.sample_dims * idx).take(self.sample_dims)
                .zip(src)
                .for_each(|(c,s)| *c = s);
    }

    /// Centroid of the cluster with the given index.
    pub fn centroid(&self, idx: usize) -> &[T] {
        &self.centroids[idx * self.sample_dims..(idx + 1) * self.sample_dims]
    }

    /// Centroids as a `k x sample_dims` matrix.
    pub fn centroid_matrix(&self) -> Result<Matrix<T>> {
        Matrix::new(self.centroids.clone(), self.k, self.sample_dims)
    }
}


/// Entrypoint of the clustering engine.
///
/// Create an instance of this struct, giving the samples you want to operate on. The primitive type
/// of the passed samples will be the type used internaly for all calculations, as well as the result
/// as stored in the returned [`KMeansState`] structure.
///
/// ## Supported variants
/// - k-Means clustering (Lloyd) [`KMeans::kmeans_lloyd`]
/// - Elbow search over a range of cluster counts [`KMeans::elbow`]
///
/// ## Supported initialization methods
/// - K-Mean++ [`KMeans::init_kmeanplusplus`]
#[derive(Clone, Debug)]
pub struct KMeans<T: Primitive> {
    pub(crate) sample_cnt: usize,
    pub(crate) sample_dims: usize,
    pub(crate) samples: Matrix<T>,
}
impl<T: Primitive> KMeans<T> {
    /// Create a new instance of the [`KMeans`] structure, taking over the samples.
    pub fn new(samples: Matrix<T>) -> Self {
        Self {
            sample_cnt: samples.rows(),
            sample_dims: samples.cols(),
            samples,
        }
    }

    pub fn samples(&self) -> &Matrix<T> { &self.samples }

    pub(crate) fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.sample_cnt {
            return Err(Error::InvalidClusterCount { requested: k, n_items: self.sample_cnt });
        }
        Ok(())
    }

    pub(crate) fn update_centroid_distances(&self, state: &mut KMeansState<T>) {
        let centroids = &state.centroids;
        let dims = self.sample_dims;

        self.samples.as_slice().par_chunks_exact(dims)
            .zip(state.assignments.par_iter().cloned())
            .zip(state.centroid_distances.par_iter_mut())
            .for_each(|((s, assignment), centroid_dist)| {
                let centroid = &centroids[assignment * dims..(assignment + 1) * dims];
                *centroid_dist = helpers::squared_distance(s, centroid);
            });
    }

    /// Assign every sample to its nearest centroid (lowest index wins ties). With **limit_k**, only
    /// the first `limit_k` centroids are considered.
    pub(crate) fn update_cluster_assignments(&self, state: &mut KMeansState<T>, limit_k: Option<usize>) {
        let centroids = &state.centroids;
        let k = limit_k.unwrap_or(state.k);
        let dims = self.sample_dims;

        self.samples.as_slice().par_chunks_exact(dims)
            .zip(state.assignments.par_iter_mut())
            .zip(state.centroid_distances.par_iter_mut())
            .for_each(|((s, assignment), centroid_dist)| {
                let best = centroids.chunks_exact(dims).take(k)
                    .map(|c| helpers::squared_distance(s, c))
                    .enumerate()
                    .min_by(|(_,d0), (_,d1)| d0.partial_cmp(d1).unwrap_or(Ordering::Equal));
                if let Some((best_idx, best_dist)) = best {
                    *assignment = best_idx;
                    *centroid_dist = best_dist;
                }
            });
    }

    pub(crate) fn update_cluster_frequencies(&self, assignments: &[usize], centroid_frequency: &mut[usize]) -> usize {
        centroid_frequency.iter_mut().for_each(|v| *v = 0);
        let mut used_centroids_cnt = 0;
        assignments.iter().cloned()
            .for_each(|centroid_id| {
                if centroid_frequency[centroid_id] == 0 {
                    used_centroids_cnt += 1; // Count the amount of centroids with more than 0 samples
                }
                centroid_frequency[centroid_id] += 1;
            });
        used_centroids_cnt
    }



    /// Normal K-Means algorithm implementation (Lloyd), using a fixed iteration budget.
    /// There is no convergence check: the calculation runs exactly **max_iter** iterations, unless the
    /// configured [`TrainingController`] is stopped, in which case the state of the last completed
    /// iteration is returned.
    ///
    /// ## Arguments
    /// - **k**: Amount of clusters to search for
    /// - **max_iter**: Amount of iterations to run
    /// - **init**: Initialization-Method to use for the initialization of the **k** centroids
    /// - **config**: [`KMeansConfig`] instance, containing the random generator, callbacks and controller
    ///
    /// ## Returns
    /// Instance of [`KMeansState`], containing the final state (result).
    ///
    /// ## Errors
    /// [`Error::InvalidClusterCount`] if **k** is zero or larger than the amount of samples.
    ///
    /// ## Example
    /// ```rust
    /// use unsupervised_lab::*;
    ///
    /// let (sample_cnt, sample_dims, k, max_iter) = (2000, 20, 4, 20);
    ///
    /// // Generate some random data
    /// let mut samples = vec![0.0f64;sample_cnt * sample_dims];
    /// samples.iter_mut().for_each(|v| *v = rand::random());
    ///
    /// // Calculate kmeans, using kmean++ as initialization-method
    /// let kmean = KMeans::new(Matrix::new(samples, sample_cnt, sample_dims).unwrap());
    /// let result = kmean.kmeans_lloyd(k, max_iter, KMeans::init_kmeanplusplus, &KMeansConfig::default()).unwrap();
    ///
    /// println!("Centroids: {:?}", result.centroids);
    /// println!("Cluster-Assignments: {:?}", result.assignments);
    /// println!("Error: {}", result.distsum);
    /// ```
    pub fn kmeans_lloyd<'a, F>(&self, k: usize, max_iter: usize, init: F, config: &KMeansConfig<'a, T>) -> Result<KMeansState<T>>
                where F: FnOnce(&KMeans<T>, &mut KMeansState<T>, &KMeansConfig<'a, T>) {
        self.check_k(k)?;
        Ok(crate::variants::Lloyd::calculate(self, k, max_iter, init, config))
    }

    /// K-Means++ initialization method.
    /// The first centroid is drawn uniformly from the samples, every following one with a probability
    /// proportional to its squared distance to the nearest already chosen centroid.
    ///
    /// ## Note
    /// This method is not meant for direct invocation. Pass a reference to it, to an instance-method of [`KMeans`].
    pub fn init_kmeanplusplus(kmean: &KMeans<T>, state: &mut KMeansState<T>, config: &KMeansConfig<'_, T>) {
        crate::inits::kmeanplusplus::calculate(kmean, state, config);
    }
}
