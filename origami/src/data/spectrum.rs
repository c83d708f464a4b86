use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Quantization used when spectra with different axes are merged.
const MERGE_DECIMALS: i32 = 6;

/// A 1D signal: mass spectrum, chromatogram or mobilogram.
///
/// `x` holds m/z, retention time or drift time values in ascending order and `y`
/// the matching intensities. Transforms never mutate a spectrum, they return a new one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Spectrum {
    /// Constructs a new `Spectrum`.
    ///
    /// # Arguments
    ///
    /// * `x` - A vector of x values (m/z, time, drift bin).
    /// * `y` - A vector of intensities corresponding to the x values.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the two vectors differ in length.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use origami::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new(vec![100.0, 200.0], vec![10.0, 20.0]).unwrap();
    /// assert_eq!(spectrum.x, vec![100.0, 200.0]);
    /// assert_eq!(spectrum.y, vec![10.0, 20.0]);
    /// assert!(Spectrum::new(vec![1.0], vec![]).is_err());
    /// ```
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(ProcessingError::ShapeMismatch { what: "spectrum intensities", expected: x.len(), found: y.len() });
        }
        Ok(Spectrum { x, y })
    }

    /// Builds a spectrum from parts that are equal in length by construction.
    pub(crate) fn from_parts(x: Vec<f64>, y: Vec<f64>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Spectrum { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Highest intensity, 0.0 for an empty spectrum.
    pub fn max_intensity(&self) -> f64 {
        self.y.iter().cloned().fold(0.0, f64::max)
    }

    pub fn total_intensity(&self) -> f64 {
        self.y.iter().sum()
    }

    /// Returns the same x-axis with new intensities.
    pub fn with_intensities(&self, y: Vec<f64>) -> Result<Self> {
        Spectrum::new(self.x.clone(), y)
    }

    /// Keeps the points inside an x and intensity window (inclusive bounds).
    ///
    /// # Example
    ///
    /// ```rust
    /// # use origami::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new(vec![100.0, 101.0, 102.0], vec![5.0, 50.0, 10.0]).unwrap();
    /// let filtered = spectrum.filter_ranged(100.5, 102.0, 6.0, 1e9);
    /// assert_eq!(filtered.x, vec![101.0, 102.0]);
    /// ```
    pub fn filter_ranged(&self, x_min: f64, x_max: f64, intensity_min: f64, intensity_max: f64) -> Self {
        let (x, y): (Vec<f64>, Vec<f64>) = self.x.iter()
            .zip(self.y.iter())
            .filter(|&(&x, &y)| x_min <= x && x <= x_max && y >= intensity_min && y <= intensity_max)
            .map(|(&x, &y)| (x, y))
            .unzip();
        Spectrum::from_parts(x, y)
    }

    /// Merges spectra that may have different axes, summing intensities at matching x values.
    ///
    /// x values are quantized to six decimals before matching, the result is sorted by x.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use origami::data::spectrum::Spectrum;
    /// let a = Spectrum::new(vec![100.5, 101.0], vec![10.0, 20.0]).unwrap();
    /// let b = Spectrum::new(vec![101.0, 102.0], vec![5.0, 30.0]).unwrap();
    /// let merged = Spectrum::from_collection(&[a, b]);
    /// assert_eq!(merged.x, vec![100.5, 101.0, 102.0]);
    /// assert_eq!(merged.y, vec![10.0, 25.0, 30.0]);
    /// ```
    pub fn from_collection(collection: &[Spectrum]) -> Spectrum {
        let factor = 10f64.powi(MERGE_DECIMALS);
        let mut combined: BTreeMap<i64, f64> = BTreeMap::new();

        for spectrum in collection {
            for (x, y) in spectrum.x.iter().zip(spectrum.y.iter()) {
                *combined.entry((x * factor).round() as i64).or_insert(0.0) += *y;
            }
        }

        let x: Vec<f64> = combined.keys().map(|&key| key as f64 / factor).collect();
        let y: Vec<f64> = combined.values().cloned().collect();
        Spectrum::from_parts(x, y)
    }

    /// Subtracts `other` from `self` on a shared axis.
    ///
    /// Returns the positive part (negative values clipped to 0) and the negative part
    /// (positive values clipped to 0) as two spectra, so both can be displayed at once.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the spectra have different lengths.
    pub fn subtract(&self, other: &Spectrum) -> Result<(Spectrum, Spectrum)> {
        if self.len() != other.len() {
            return Err(ProcessingError::ShapeMismatch { what: "subtracted spectrum", expected: self.len(), found: other.len() });
        }
        let (positive, negative): (Vec<f64>, Vec<f64>) = izip!(&self.y, &other.y)
            .map(|(a, b)| {
                let diff = a - b;
                (diff.max(0.0), diff.min(0.0))
            })
            .unzip();
        Ok((Spectrum::from_parts(self.x.clone(), positive), Spectrum::from_parts(self.x.clone(), negative)))
    }
}

impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let apex = self.x.iter()
            .zip(self.y.iter())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        match apex {
            Some((x, y)) => write!(f, "Spectrum(data points: {}, max by intensity: ({:.3}, {}))", self.len(), x, y),
            None => write!(f, "Spectrum(data points: 0)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_splits_signs() {
        let a = Spectrum::new(vec![1.0, 2.0, 3.0], vec![5.0, 1.0, 3.0]).unwrap();
        let b = Spectrum::new(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 3.0]).unwrap();
        let (pos, neg) = a.subtract(&b).unwrap();
        assert_eq!(pos.y, vec![3.0, 0.0, 0.0]);
        assert_eq!(neg.y, vec![0.0, -3.0, 0.0]);
    }

    #[test]
    fn test_subtract_rejects_mismatched_lengths() {
        let a = Spectrum::new(vec![1.0, 2.0], vec![5.0, 1.0]).unwrap();
        let b = Spectrum::new(vec![1.0], vec![2.0]).unwrap();
        assert!(matches!(a.subtract(&b), Err(ProcessingError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_display_empty() {
        assert_eq!(Spectrum::default().to_string(), "Spectrum(data points: 0)");
    }

    #[test]
    fn test_max_and_total() {
        let s = Spectrum::new(vec![1.0, 2.0, 3.0], vec![1.0, 4.0, 2.0]).unwrap();
        assert_eq!(s.max_intensity(), 4.0);
        assert_eq!(s.total_intensity(), 7.0);
    }
}
