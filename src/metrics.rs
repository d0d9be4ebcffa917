//! Comparison of cluster assignments against ground-truth labels.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Purity plus the `clusters x classes` confusion (contingency) matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvaluation {
    /// Fraction of samples whose cluster's majority label equals their own label, in `[0, 1]`.
    pub purity: f64,
    /// `confusion[cluster][label]` = number of samples with that assignment and label.
    pub confusion: Vec<Vec<usize>>,
}
impl ClusterEvaluation {
    /// Sum over all cells; equals the number of evaluated samples.
    pub fn total(&self) -> usize {
        self.confusion.iter().flatten().sum()
    }
}

/// Build the confusion matrix of **assignments** vs. **labels** and derive the purity from it.
///
/// The matrix has `max(assignments) + 1` rows and `max(labels) + 1` columns.
///
/// ## Errors
/// [`Error::LengthMismatch`] if both slices differ in length.
///
/// ## Example
/// ```rust
/// let eval = unsupervised_lab::evaluate(&[0, 0, 1, 1], &[1, 1, 0, 1]).unwrap();
/// assert_eq!(eval.purity, 0.75);
/// assert_eq!(eval.confusion, vec![vec![0, 2], vec![1, 1]]);
/// ```
pub fn evaluate(assignments: &[usize], labels: &[usize]) -> Result<ClusterEvaluation> {
    if assignments.len() != labels.len() {
        return Err(Error::LengthMismatch { assignments: assignments.len(), labels: labels.len() });
    }
    let (Some(&max_cluster), Some(&max_label)) = (assignments.iter().max(), labels.iter().max()) else {
        return Ok(ClusterEvaluation { purity: 0.0, confusion: Vec::new() });
    };

    let mut confusion = vec![vec![0usize; max_label + 1]; max_cluster + 1];
    assignments.iter().zip(labels.iter())
        .for_each(|(&cluster, &label)| confusion[cluster][label] += 1);

    let majority_sum: usize = confusion.iter()
        .map(|row| row.iter().copied().max().unwrap_or(0))
        .sum();

    Ok(ClusterEvaluation {
        purity: majority_sum as f64 / assignments.len() as f64,
        confusion,
    })
}
