use crate::{Error, Result};
use num::{Float, NumCast, Zero};
use rand::distributions::uniform::SampleUniform;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, LowerExp},
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
    slice::ChunksExact,
};

pub trait Primitive: Add + AddAssign + Sum + Sub + SubAssign + Zero + Float + NumCast + SampleUniform
                + PartialOrd + Copy + Default + Display + Debug + Sync + Send + LowerExp + 'static
                + for<'a> AddAssign<&'a Self> {}
impl Primitive for f32 {}
impl Primitive for f64 {}

/// Dense matrix of samples [row-major] = [<row0>,<row1>,<row2>,...]
///
/// Every computation in this crate takes its input as a [`Matrix`]. Once built for a run, a matrix is
/// not mutated; transformations (such as [`crate::preprocess()`]) return a new matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}
impl<T: Primitive> Matrix<T> {
    /// Create a matrix from a row-major buffer.
    ///
    /// ## Errors
    /// [`Error::ShapeMismatch`] if `data.len() != rows * cols` or `cols == 0`.
    pub fn new(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if cols == 0 || data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                expected: format!("{rows}x{cols} (non-zero columns)"),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::new(vec![T::zero(); rows * cols], rows, cols)
    }

    /// Create a matrix from a list of equally long rows.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map(Vec::len).ok_or(Error::EmptyInput)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(Error::ShapeMismatch {
                expected: format!("rows of {cols} values"),
                actual: format!("row of {} values", bad.len()),
            });
        }
        Self::new(rows.iter().flatten().cloned().collect(), rows.len(), cols)
    }

    #[inline] pub fn rows(&self) -> usize { self.rows }
    #[inline] pub fn cols(&self) -> usize { self.cols }
    #[inline] pub fn is_empty(&self) -> bool { self.rows == 0 }
    #[inline] pub fn as_slice(&self) -> &[T] { &self.data }
    pub fn into_vec(self) -> Vec<T> { self.data }

    #[inline]
    pub fn row(&self, idx: usize) -> &[T] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    pub fn iter_rows(&self) -> ChunksExact<'_, T> {
        self.data.chunks_exact(self.cols)
    }

    /// Copy the given rows (in the given order) into a new matrix.
    pub fn select_rows(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let data: Vec<T> = indices.into_iter()
            .flat_map(|i| self.row(i).iter().cloned())
            .collect();
        Self { rows: data.len() / self.cols, cols: self.cols, data }
    }

    /// Convert every value into another primitive type.
    pub fn cast<U: Primitive>(&self) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| crate::helpers::cast(v.to_f64().unwrap_or(f64::NAN))).collect(),
        }
    }

    pub(crate) fn map(&self, f: impl Fn(T) -> T) -> Self {
        Self { rows: self.rows, cols: self.cols, data: self.data.iter().cloned().map(f).collect() }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [T] { &mut self.data }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_validation() {
        assert!(Matrix::new(vec![1.0f64, 2.0, 3.0], 2, 2).is_err());
        assert!(Matrix::<f64>::new(vec![], 3, 0).is_err());
        assert!(Matrix::<f64>::new(vec![], 0, 4).unwrap().is_empty());
        assert!(Matrix::from_rows(&[vec![1.0f32, 2.0], vec![3.0]]).is_err());
        assert_eq!(Matrix::<f64>::from_rows(&[]), Err(Error::EmptyInput));
    }

    #[test]
    fn row_access_and_selection() {
        let m = Matrix::from_rows(&[vec![1.0f64, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.get(2, 1), 6.0);
        assert_eq!(m.iter_rows().count(), 3);

        let picked = m.select_rows([2, 0]);
        assert_eq!(picked.as_slice(), &[5.0, 6.0, 1.0, 2.0]);
        assert_eq!(picked.rows(), 2);

        let as_f32: Matrix<f32> = m.cast();
        assert_eq!(as_f32.row(0), &[1.0f32, 2.0]);
    }
}
