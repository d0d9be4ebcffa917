use crate::{helpers, KMeans, KMeansState, KMeansConfig, memory::*};
use rand::prelude::*;

pub(crate) struct Lloyd<T: Primitive> {
	_p: std::marker::PhantomData<T>
}
impl<T: Primitive> Lloyd<T> {
    /// Recompute every centroid as the mean of its assigned samples.
    /// Centroids of empty clusters are re-initialized to a uniformly drawn sample.
    fn update_centroids(data: &KMeans<T>, state: &mut KMeansState<T>, config: &KMeansConfig<'_, T>) {
        let dims = data.sample_dims;
        // Sum all samples in a cluster together into new_centroids
        // Count non-empty clusters
        let mut used_centroids_cnt = 0;
        let mut new_centroids = vec![T::zero(); state.centroids.len()];

        let (centroid_frequency, assignments) = (&mut state.centroid_frequency, &state.assignments);
        rayon::scope(|s| {
            s.spawn(|_| {
                used_centroids_cnt = data.update_cluster_frequencies(assignments, centroid_frequency);
            });
            s.spawn(|_| {
                data.samples.iter_rows()
                    .zip(assignments.iter().cloned())
                    .for_each(|(s, centroid_id)| {
                        new_centroids[centroid_id * dims..(centroid_id + 1) * dims].iter_mut()
                            .zip(s.iter())
                            .for_each(|(c, sv)| *c += sv);
                    });
            });
        });

        // Calculate new centroids from the sums
        state.centroids.chunks_exact_mut(dims)
            .zip(new_centroids.chunks_exact(dims))
            .zip(state.centroid_frequency.iter().cloned())
            .filter(|(_, cfreq)| *cfreq > 0)
            .for_each(|((c, nc), cfreq)| {
                let cfreq = helpers::cast::<T>(cfreq as f64);
                c.iter_mut().zip(nc.iter()).for_each(|(cv, &ncv)| *cv = ncv / cfreq);
            });

        // Use used_centroids_cnt variable to check, whether there are empty clusters
        if used_centroids_cnt != state.k {
            for i in 0..state.k {
                if state.centroid_frequency[i] == 0 {
                    let sample_id = config.rnd.borrow_mut().gen_range(0..data.sample_cnt);
                    tracing::warn!(cluster = i, sample_id, "empty cluster, re-initializing centroid");
                    state.set_centroid_from_iter(i, data.samples.row(sample_id).iter().cloned());
                }
            }
        }
    }

    /// One Lloyd iteration: assignment step, update step and the resulting SSE with respect to the
    /// updated centroids.
    pub(crate) fn step(data: &KMeans<T>, state: &mut KMeansState<T>, config: &KMeansConfig<'_, T>) {
        data.update_cluster_assignments(state, None);
        Self::update_centroids(data, state, config);
        data.update_centroid_distances(state);
        state.distsum = state.centroid_distances.iter().cloned().sum();
    }

    pub(crate) fn calculate<'a, F>(data: &KMeans<T>, k: usize, max_iter: usize, init: F, config: &KMeansConfig<'a, T>) -> KMeansState<T>
                where F: FnOnce(&KMeans<T>, &mut KMeansState<T>, &KMeansConfig<'a, T>) {
        let mut state = KMeansState::new(data.sample_cnt, data.sample_dims, k);
        init(data, &mut state, config);
        (config.init_done)(&state);

        let mut iteration = 0;
        while iteration < max_iter && config.keep_running() {
            iteration += 1;
            Self::step(data, &mut state, config);
            state.iterations = iteration;
            tracing::debug!(iteration, distsum = %state.distsum, "k-means iteration done");
            (config.iteration_done)(&state, iteration);

            if iteration < max_iter && config.keep_running() {
                config.pause();
            }
        }
        state
    }
}
