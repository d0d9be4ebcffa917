use crate::memory::*;
use crate::{KMeans, KMeansConfig, KMeansState};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::ops::DerefMut;

#[inline(always)]
pub fn calculate<T: Primitive>(kmean: &KMeans<T>, state: &mut KMeansState<T>, config: &KMeansConfig<'_, T>) {
    {
        // Randomly select first centroid
        let first_idx = config.rnd.borrow_mut().gen_range(0..kmean.sample_cnt);
        state.set_centroid_from_iter(0, kmean.samples.row(first_idx).iter().cloned());
    }
    for k in 1..state.k {
        // For each following centroid...
        // Calculate distances to the nearest already chosen centroid
        kmean.update_cluster_assignments(state, Some(k));

        let distsum: T = state.centroid_distances.iter().cloned().sum();

        // Calculate probabilities for each of the samples, to be the new centroid
        let centroid_probabilities: Vec<T> = state.centroid_distances.iter().cloned().map(|d| d / distsum).collect();
        // Use rand's WeightedIndex to randomly draw a centroid, while respecting their probabilities
        let sampled_centroid_id = match WeightedIndex::new(centroid_probabilities) {
            Ok(centroid_index) => centroid_index.sample(config.rnd.borrow_mut().deref_mut()),
            Err(err) => {
                // All samples coincide with chosen centroids (or distances degenerated)
                tracing::warn!(centroid = k, %err, "degenerate k-means++ weights, drawing uniformly");
                config.rnd.borrow_mut().gen_range(0..kmean.sample_cnt)
            }
        };
        state.set_centroid_from_iter(k, kmean.samples.row(sampled_centroid_id).iter().cloned());
    }
}
