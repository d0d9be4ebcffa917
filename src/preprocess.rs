use crate::{helpers, Error, Matrix, Primitive, Result};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Options for deriving the working matrix from a raw dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Per-column min-max normalization to `[0, 1]`
    pub scale: bool,
    /// Add gaussian noise (and clip to `[0, 1]` afterwards)
    pub add_noise: bool,
    /// Standard deviation of the noise
    pub noise_level: f64,
}
impl Default for PreprocessOptions {
    fn default() -> Self {
        Self { scale: true, add_noise: false, noise_level: 0.1 }
    }
}

/// Derive a new working matrix from **matrix**; the input is left untouched.
///
/// ## Errors
/// [`Error::InvalidParameter`] if noise is requested with a negative or non-finite **noise_level**.
pub fn preprocess<T: Primitive>(matrix: &Matrix<T>, options: &PreprocessOptions, rnd: &mut dyn RngCore) -> Result<Matrix<T>> {
    let mut processed = if options.scale { min_max_scale(matrix) } else { matrix.clone() };
    if options.add_noise {
        add_gaussian_noise(&mut processed, options.noise_level, rnd)?;
    }
    Ok(processed)
}

/// Scale every column to `[0, 1]`. Columns with a zero range are left unchanged.
pub fn min_max_scale<T: Primitive>(matrix: &Matrix<T>) -> Matrix<T> {
    let cols = matrix.cols();
    let (mins, maxs) = matrix.iter_rows().fold(
        (vec![T::infinity(); cols], vec![T::neg_infinity(); cols]),
        |(mut mins, mut maxs), row| {
            for (d, &v) in row.iter().enumerate() {
                mins[d] = mins[d].min(v);
                maxs[d] = maxs[d].max(v);
            }
            (mins, maxs)
        },
    );

    let mut scaled = matrix.clone();
    scaled.data_mut().chunks_exact_mut(cols).for_each(|row| {
        row.iter_mut().enumerate().for_each(|(d, v)| {
            let range = maxs[d] - mins[d];
            if range > T::zero() {
                *v = (*v - mins[d]) / range;
            }
        });
    });
    scaled
}

/// Add independent N(0, noise_level²) noise to every value, then clip to `[0, 1]`.
pub fn add_gaussian_noise<T: Primitive>(matrix: &mut Matrix<T>, noise_level: f64, rnd: &mut dyn RngCore) -> Result<()> {
    if !(noise_level >= 0.0 && noise_level.is_finite()) {
        return Err(Error::invalid("noise_level", format!("{noise_level} is not a non-negative number")));
    }
    let noise = Normal::new(0.0, noise_level)
        .map_err(|err| Error::invalid("noise_level", err.to_string()))?;
    matrix.data_mut().iter_mut().for_each(|v| {
        let noisy = *v + helpers::cast::<T>(noise.sample(rnd));
        *v = num::clamp(noisy, T::zero(), T::one());
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_normalizes_columns() {
        let raw = Matrix::from_rows(&[vec![1.0f64, 10.0, 5.0], vec![3.0, 20.0, 5.0], vec![2.0, 15.0, 5.0]]).unwrap();
        let mut rnd = StdRng::seed_from_u64(0);
        let options = PreprocessOptions { scale: true, add_noise: false, noise_level: 0.1 };
        let scaled = preprocess(&raw, &options, &mut rnd).unwrap();

        assert_eq!(scaled.row(0), &[0.0, 0.0, 5.0]);
        assert_eq!(scaled.row(1), &[1.0, 1.0, 5.0]);
        assert_eq!(scaled.row(2), &[0.5, 0.5, 5.0]);
        // Input is not mutated
        assert_eq!(raw.row(0), &[1.0, 10.0, 5.0]);
    }

    #[test]
    fn noise_is_clipped() {
        let raw = Matrix::new(vec![0.0f32, 1.0, 0.5, 0.5].repeat(250), 500, 2).unwrap();
        let mut rnd = StdRng::seed_from_u64(42);
        let options = PreprocessOptions { scale: false, add_noise: true, noise_level: 0.5 };
        let noisy = preprocess(&raw, &options, &mut rnd).unwrap();

        assert!(noisy.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_ne!(noisy, raw);
        let mean_shift: f32 = noisy.as_slice().iter().zip(raw.as_slice()).map(|(a, b)| (a - b).abs()).sum::<f32>() / 1000.0;
        assert!(mean_shift > 0.05);
    }

    #[test]
    fn small_noise_stays_close() {
        let raw = Matrix::new(vec![0.5f64; 400], 200, 2).unwrap();
        let mut rnd = StdRng::seed_from_u64(1);
        let options = PreprocessOptions { scale: false, add_noise: true, noise_level: 0.01 };
        let noisy = preprocess(&raw, &options, &mut rnd).unwrap();
        let mean: f64 = noisy.as_slice().iter().sum::<f64>() / 400.0;
        assert_approx_eq!(mean, 0.5, 0.005);
    }

    #[test]
    fn empty_and_invalid_input() {
        let mut rnd = StdRng::seed_from_u64(0);
        let empty = Matrix::<f64>::new(vec![], 0, 3).unwrap();
        let options = PreprocessOptions { scale: true, add_noise: true, noise_level: 0.1 };
        assert!(preprocess(&empty, &options, &mut rnd).unwrap().is_empty());

        let raw = Matrix::new(vec![0.5f64; 4], 2, 2).unwrap();
        let options = PreprocessOptions { scale: false, add_noise: true, noise_level: -1.0 };
        assert!(matches!(preprocess(&raw, &options, &mut rnd), Err(Error::InvalidParameter { name: "noise_level", .. })));
    }

    #[test]
    fn negative_or_nan_noise_level_is_rejected_without_touching_the_matrix() {
        let mut rnd = StdRng::seed_from_u64(0);
        let raw = Matrix::new(vec![0.25f64, 0.75], 1, 2).unwrap();
        for level in [-0.5, -f64::MIN_POSITIVE, f64::NAN, f64::INFINITY] {
            let mut noisy = raw.clone();
            assert!(matches!(add_gaussian_noise(&mut noisy, level, &mut rnd), Err(Error::InvalidParameter { name: "noise_level", .. })));
            assert_eq!(noisy, raw);
        }
        let mut exact = raw.clone();
        add_gaussian_noise(&mut exact, 0.0, &mut rnd).unwrap();
        assert_eq!(exact, raw);
    }
}
