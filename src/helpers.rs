use crate::Primitive;

/// Squared euclidean distance between two equally long samples.
#[inline(always)]
pub(crate) fn squared_distance<T: Primitive>(a: &[T], b: &[T]) -> T {
    a.iter().zip(b.iter())
        .map(|(&sv, &cv)| sv - cv)      // <sample> - <centroid>
        .map(|v| v * v)                 // <vec_components> ^2
        .sum()                          // sum(<vec_components>^2)
}

/// Lossy conversion of a constant into the primitive type used for a calculation.
#[inline(always)]
pub(crate) fn cast<T: Primitive>(v: f64) -> T {
    T::from(v).unwrap_or_else(T::nan)
}

#[cfg(test)]
macro_rules! assert_approx_eq {
	($left: expr, $right: expr, $tol: expr) => ({
		match ($left, $right, $tol) {
			(left_val , right_val, tol_val) => {
				let delta = (left_val - right_val).abs();
				if !(delta < tol_val) {
					panic!(
						"assertion failed: `(left ≈ right)` \
						(left: `{}`, right: `{}`) \
						with ∆={:1.1e} (allowed ∆={:e})",
						left_val , right_val, delta, tol_val
					)
				}
			}
		}
	});
	($left: expr, $right: expr) => (assert_approx_eq!(($left), ($right), 1e-15))
}

#[cfg(test)]
pub(crate) mod testing {
	use crate::Matrix;
	use rand::prelude::*;
	use rand_distr::Normal;

	/// Petal length / petal width of the 150 iris flowers (setosa, versicolor, virginica; 50 each).
	pub fn iris_petals() -> Matrix<f64> {
		let samples = vec![1.4f64, 0.2, 1.4, 0.2, 1.3, 0.2, 1.5, 0.2, 1.4, 0.2, 1.7, 0.4, 1.4, 0.3, 1.5, 0.2, 1.4, 0.2, 1.5, 0.1, 1.5, 0.2, 1.6, 0.2, 1.4, 0.1, 1.1, 0.1, 1.2, 0.2, 1.5, 0.4, 1.3, 0.4, 1.4, 0.3, 1.7, 0.3, 1.5, 0.3, 1.7, 0.2, 1.5, 0.4, 1.0, 0.2, 1.7, 0.5, 1.9, 0.2, 1.6, 0.2, 1.6, 0.4, 1.5, 0.2, 1.4, 0.2, 1.6, 0.2, 1.6, 0.2, 1.5, 0.4, 1.5, 0.1, 1.4, 0.2, 1.5, 0.2, 1.2, 0.2, 1.3, 0.2, 1.4, 0.1, 1.3, 0.2, 1.5, 0.2, 1.3, 0.3, 1.3, 0.3, 1.3, 0.2, 1.6, 0.6, 1.9, 0.4, 1.4, 0.3, 1.6, 0.2, 1.4, 0.2, 1.5, 0.2, 1.4, 0.2, 4.7, 1.4, 4.5, 1.5, 4.9, 1.5, 4.0, 1.3, 4.6, 1.5, 4.5, 1.3, 4.7, 1.6, 3.3, 1.0, 4.6, 1.3, 3.9, 1.4, 3.5, 1.0, 4.2, 1.5, 4.0, 1.0, 4.7, 1.4, 3.6, 1.3, 4.4, 1.4, 4.5, 1.5, 4.1, 1.0, 4.5, 1.5, 3.9, 1.1, 4.8, 1.8, 4.0, 1.3, 4.9, 1.5, 4.7, 1.2, 4.3, 1.3, 4.4, 1.4, 4.8, 1.4, 5.0, 1.7, 4.5, 1.5, 3.5, 1.0, 3.8, 1.1, 3.7, 1.0, 3.9, 1.2, 5.1, 1.6, 4.5, 1.5, 4.5, 1.6, 4.7, 1.5, 4.4, 1.3, 4.1, 1.3, 4.0, 1.3, 4.4, 1.2, 4.6, 1.4, 4.0, 1.2, 3.3, 1.0, 4.2, 1.3, 4.2, 1.2, 4.2, 1.3, 4.3, 1.3, 3.0, 1.1, 4.1, 1.3, 6.0, 2.5, 5.1, 1.9, 5.9, 2.1, 5.6, 1.8, 5.8, 2.2, 6.6, 2.1, 4.5, 1.7, 6.3, 1.8, 5.8, 1.8, 6.1, 2.5, 5.1, 2.0, 5.3, 1.9, 5.5, 2.1, 5.0, 2.0, 5.1, 2.4, 5.3, 2.3, 5.5, 1.8, 6.7, 2.2, 6.9, 2.3, 5.0, 1.5, 5.7, 2.3, 4.9, 2.0, 6.7, 2.0, 4.9, 1.8, 5.7, 2.1, 6.0, 1.8, 4.8, 1.8, 4.9, 1.8, 5.6, 2.1, 5.8, 1.6, 6.1, 1.9, 6.4, 2.0, 5.6, 2.2, 5.1, 1.5, 5.6, 1.4, 6.1, 2.3, 5.6, 2.4, 5.5, 1.8, 4.8, 1.8, 5.4, 2.1, 5.6, 2.4, 5.1, 2.3, 5.1, 1.9, 5.9, 2.3, 5.7, 2.5, 5.2, 2.3, 5.0, 1.9, 5.2, 2.0, 5.4, 2.3, 5.1, 1.8];
		Matrix::new(samples, 150, 2).unwrap()
	}

	pub fn iris_labels() -> Vec<usize> {
		(0..150).map(|i| i / 50).collect()
	}

	/// Isotropic gaussian clusters around the given centers, `per_cluster` rows each, in center order.
	pub fn gaussian_blobs(centers: &[Vec<f64>], per_cluster: usize, spread: f64, rnd: &mut impl Rng) -> (Matrix<f64>, Vec<usize>) {
		let noise = Normal::new(0.0, spread).unwrap();
		let mut rows = Vec::new();
		let mut labels = Vec::new();
		for (label, center) in centers.iter().enumerate() {
			for _ in 0..per_cluster {
				rows.push(center.iter().map(|c| c + noise.sample(rnd)).collect());
				labels.push(label);
			}
		}
		(Matrix::from_rows(&rows).unwrap(), labels)
	}

	/// 28x28 "images" in `classes` balanced groups: each class lights up its own band of pixels.
	pub fn digit_like(classes: usize, per_class: usize, rnd: &mut impl Rng) -> (Matrix<f64>, Vec<usize>) {
		let dims = 784;
		let band = dims / classes;
		let mut rows = Vec::new();
		let mut labels = Vec::new();
		for class in 0..classes {
			for _ in 0..per_class {
				rows.push((0..dims).map(|px| {
					let lit = px / band == class;
					if lit { rnd.gen_range(0.7..1.0) } else { rnd.gen_range(0.0..0.1) }
				}).collect());
				labels.push(class);
			}
		}
		(Matrix::from_rows(&rows).unwrap(), labels)
	}

	/// Average euclidean distance between point pairs of the same label vs. pairs of differing labels.
	pub fn within_and_across(embedding: &Matrix<f64>, labels: &[usize]) -> (f64, f64) {
		let (mut within, mut within_cnt, mut across, mut across_cnt) = (0.0, 0usize, 0.0, 0usize);
		for i in 0..embedding.rows() {
			for j in (i + 1)..embedding.rows() {
				let d = crate::helpers::squared_distance(embedding.row(i), embedding.row(j)).sqrt();
				if labels[i] == labels[j] {
					within += d;
					within_cnt += 1;
				} else {
					across += d;
					across_cnt += 1;
				}
			}
		}
		(within / within_cnt as f64, across / across_cnt as f64)
	}
}


#[cfg(test)]
mod tests {
	#[test]
    fn squared_distance() {
		assert_eq!(super::squared_distance(&[1.0f64, 2.0], &[4.0, 6.0]), 25.0);
		assert_eq!(super::squared_distance(&[0.5f32], &[0.5]), 0.0);
		assert_eq!(super::squared_distance::<f64>(&[], &[]), 0.0);
    }
}
