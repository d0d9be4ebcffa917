use crate::{variants::Lloyd, KMeans, KMeansConfig, KMeansState, Primitive};
use serde::{Deserialize, Serialize};

/// Best SSE found for one cluster count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElbowPoint<T> {
    pub k: usize,
    pub sse: T,
}

/// Progress of a running elbow search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElbowProgress<'a, T> {
    /// Restarts for this cluster count are about to start
    Started { k: usize },
    /// Cluster count finished, point was appended to the curve
    Finished(&'a ElbowPoint<T>),
}

/// Parameters of an elbow search: for each `k` in `min_k..=max_k`, run `restarts` independent k-means++
/// seeded runs with exactly `iterations` Lloyd iterations each, keeping the lowest final SSE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElbowSearch {
    pub min_k: usize,
    pub max_k: usize,
    pub restarts: usize,
    pub iterations: usize,
}
impl Default for ElbowSearch {
    fn default() -> Self {
        Self { min_k: 2, max_k: 10, restarts: 3, iterations: 10 }
    }
}

impl<T: Primitive> KMeans<T> {
    /// Elbow curve with the default search parameters, see [`ElbowSearch`].
    pub fn elbow(&self, config: &KMeansConfig<'_, T>) -> Vec<ElbowPoint<T>> {
        ElbowSearch::default().run(self, config, |_| {})
    }
}

impl ElbowSearch {
    /// Run the search.
    ///
    /// The configured controller is consulted before each cluster count; once stopped, the points
    /// completed so far are returned. The search ends early when `k` exceeds the number of samples.
    pub fn run<T: Primitive>(&self, kmean: &KMeans<T>, config: &KMeansConfig<'_, T>, mut progress: impl FnMut(ElbowProgress<'_, T>)) -> Vec<ElbowPoint<T>> {
        let mut curve = Vec::with_capacity(self.max_k.saturating_sub(self.min_k) + 1);
        for k in self.min_k.max(1)..=self.max_k {
            if !config.keep_running() {
                tracing::debug!(k, "elbow search cancelled");
                break;
            }
            if k > kmean.sample_cnt {
                tracing::debug!(k, samples = kmean.sample_cnt, "elbow search ran out of samples");
                break;
            }
            progress(ElbowProgress::Started { k });

            let sse = (0..self.restarts)
                .map(|_| {
                    let mut state = KMeansState::new(kmean.sample_cnt, kmean.sample_dims, k);
                    KMeans::init_kmeanplusplus(kmean, &mut state, config);
                    for _ in 0..self.iterations {
                        Lloyd::step(kmean, &mut state, config);
                    }
                    state.distsum
                })
                .fold(T::infinity(), |best, sse| best.min(sse));

            tracing::debug!(k, sse = %sse, "elbow point done");
            curve.push(ElbowPoint { k, sse });
            if let Some(point) = curve.last() {
                progress(ElbowProgress::Finished(point));
            }
            config.pause();
        }
        curve
    }
}
