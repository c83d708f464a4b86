use std::fmt;
use std::fmt::{Display, Formatter};

use nalgebra::DMatrix;

use crate::error::{ProcessingError, Result};

/// A 2D intensity array with coordinate axes.
///
/// Indexed `[row, column]`: rows follow `y` (e.g. drift-time bins), columns follow `x`
/// (e.g. scans, voltages or m/z bins).
#[derive(Clone, Debug, PartialEq)]
pub struct Heatmap {
    pub array: DMatrix<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Heatmap {
    /// Creates a new `Heatmap`.
    ///
    /// # Arguments
    ///
    /// * `array` - Intensities, `y.len()` rows by `x.len()` columns.
    /// * `x` - Column coordinates.
    /// * `y` - Row coordinates.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the axes disagree with the array shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use nalgebra::DMatrix;
    /// use origami::data::heatmap::Heatmap;
    ///
    /// let array = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    /// let heatmap = Heatmap::new(array, vec![1.0, 2.0, 3.0], vec![0.5, 1.5]).unwrap();
    /// assert_eq!(heatmap.shape(), (2, 3));
    /// ```
    pub fn new(array: DMatrix<f64>, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if array.nrows() != y.len() {
            return Err(ProcessingError::ShapeMismatch { what: "heatmap rows", expected: y.len(), found: array.nrows() });
        }
        if array.ncols() != x.len() {
            return Err(ProcessingError::ShapeMismatch { what: "heatmap columns", expected: x.len(), found: array.ncols() });
        }
        Ok(Heatmap { array, x, y })
    }

    /// Heatmap with index axes (`0, 1, 2, ...`) on both dimensions.
    pub fn from_array(array: DMatrix<f64>) -> Self {
        let x = (0..array.ncols()).map(|i| i as f64).collect();
        let y = (0..array.nrows()).map(|i| i as f64).collect();
        Heatmap { array, x, y }
    }

    pub(crate) fn from_parts(array: DMatrix<f64>, x: Vec<f64>, y: Vec<f64>) -> Self {
        debug_assert_eq!(array.nrows(), y.len());
        debug_assert_eq!(array.ncols(), x.len());
        Heatmap { array, x, y }
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        self.array.shape()
    }

    pub fn ncols(&self) -> usize {
        self.array.ncols()
    }

    pub fn nrows(&self) -> usize {
        self.array.nrows()
    }

    /// Sums over the columns, giving the row profile (e.g. a mobilogram).
    pub fn sum_rows(&self) -> Vec<f64> {
        self.array.row_iter().map(|row| row.sum()).collect()
    }

    /// Sums over the rows, giving the column profile (e.g. a chromatogram).
    pub fn sum_columns(&self) -> Vec<f64> {
        self.array.column_iter().map(|column| column.sum()).collect()
    }
}

impl Display for Heatmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Heatmap(rows: {}, columns: {}, total intensity: {})", self.nrows(), self.ncols(), self.array.sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mismatched_axes() {
        let array = DMatrix::zeros(2, 3);
        assert!(Heatmap::new(array.clone(), vec![1.0, 2.0], vec![0.0, 1.0]).is_err());
        assert!(Heatmap::new(array, vec![1.0, 2.0, 3.0], vec![0.0]).is_err());
    }

    #[test]
    fn test_profiles() {
        let array = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let heatmap = Heatmap::from_array(array);
        assert_eq!(heatmap.sum_rows(), vec![6.0, 15.0]);
        assert_eq!(heatmap.sum_columns(), vec![5.0, 7.0, 9.0]);
        assert_eq!(heatmap.x, vec![0.0, 1.0, 2.0]);
    }
}
