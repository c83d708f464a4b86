use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, RowDVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::error::{ProcessingError, Result};

/// Gaussian kernels are cut at this many standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMode {
    #[default]
    None,
    Gaussian,
    #[serde(rename = "Savitzky-Golay")]
    SavitzkyGolay,
    #[serde(rename = "Moving average")]
    MovingAverage,
}

impl SmoothingMode {
    pub fn name(&self) -> &'static str {
        match self {
            SmoothingMode::None => "None",
            SmoothingMode::Gaussian => "Gaussian",
            SmoothingMode::SavitzkyGolay => "Savitzky-Golay",
            SmoothingMode::MovingAverage => "Moving average",
        }
    }
}

impl fmt::Display for SmoothingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SmoothingMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" => Ok(SmoothingMode::None),
            "Gaussian" => Ok(SmoothingMode::Gaussian),
            "Savitzky-Golay" => Ok(SmoothingMode::SavitzkyGolay),
            "Moving average" => Ok(SmoothingMode::MovingAverage),
            other => Err(ProcessingError::unknown_mode("smoothing", other)),
        }
    }
}

/// Configuration for 1D and 2D smoothing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Smoothing algorithm (default: None)
    pub mode: SmoothingMode,
    /// Standard deviation of the Gaussian kernel, in points (default: 1.0)
    pub sigma: f64,
    /// Window length for Savitzky-Golay and moving average, odd (default: 5)
    pub window: usize,
    /// Savitzky-Golay polynomial order, below `window` (default: 2)
    pub polynomial: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            mode: SmoothingMode::None,
            sigma: 1.0,
            window: 5,
            polynomial: 2,
        }
    }
}

impl SmoothingConfig {
    pub fn gaussian(sigma: f64) -> Self {
        SmoothingConfig { mode: SmoothingMode::Gaussian, sigma, ..Default::default() }
    }

    pub fn savitzky_golay(window: usize, polynomial: usize) -> Self {
        SmoothingConfig { mode: SmoothingMode::SavitzkyGolay, window, polynomial, ..Default::default() }
    }

    pub fn moving_average(window: usize) -> Self {
        SmoothingConfig { mode: SmoothingMode::MovingAverage, window, ..Default::default() }
    }

    /// Checks the parameters used by the selected mode.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            SmoothingMode::None => Ok(()),
            SmoothingMode::Gaussian => {
                if !(self.sigma.is_finite() && self.sigma >= 0.0) {
                    return Err(ProcessingError::invalid("sigma", format!("must be a non-negative number, got {}", self.sigma)));
                }
                Ok(())
            }
            SmoothingMode::SavitzkyGolay => {
                check_odd_window(self.window)?;
                if self.window <= self.polynomial {
                    return Err(ProcessingError::invalid(
                        "window",
                        format!("must be greater than the polynomial order {}, got {}", self.polynomial, self.window),
                    ));
                }
                Ok(())
            }
            SmoothingMode::MovingAverage => check_odd_window(self.window),
        }
    }

    /// Shortest signal the selected mode can smooth.
    fn min_length(&self) -> usize {
        match self.mode {
            SmoothingMode::SavitzkyGolay | SmoothingMode::MovingAverage => self.window,
            _ => 1,
        }
    }
}

fn check_odd_window(window: usize) -> Result<()> {
    if window == 0 || window % 2 == 0 {
        return Err(ProcessingError::invalid("window", format!("must be a positive odd number, got {}", window)));
    }
    Ok(())
}

/// Smooths a 1D signal.
///
/// # Arguments
///
/// * `values` - Intensities.
/// * `config` - Mode and its parameters.
///
/// # Errors
///
/// `InvalidParameter` for a negative sigma, an even window, or a window not above the polynomial order.
///
/// # Examples
///
/// ```
/// use origami::algorithm::smoothing::{smooth_1d, SmoothingConfig};
///
/// let values = vec![0.0, 0.0, 3.0, 0.0, 0.0];
/// let smoothed = smooth_1d(&values, &SmoothingConfig::moving_average(3)).unwrap();
/// assert_eq!(smoothed[0], 0.0);
/// assert!((smoothed[2] - 1.0).abs() < 1e-12);
///
/// let unchanged = smooth_1d(&values, &SmoothingConfig::gaussian(0.0)).unwrap();
/// assert_eq!(unchanged, values);
/// ```
pub fn smooth_1d(values: &[f64], config: &SmoothingConfig) -> Result<Vec<f64>> {
    config.validate()?;
    if config.mode == SmoothingMode::None || values.is_empty() {
        return Ok(values.to_vec());
    }
    if values.len() < config.min_length() {
        warn!("{} smoothing skipped: {} points is shorter than the window of {}", config.mode, values.len(), config.window);
        return Ok(values.to_vec());
    }
    let kernel = Kernel::new(config)?;
    Ok(kernel.apply(values))
}

/// Smooths a 2D array, keeping its shape.
///
/// Gaussian smoothing runs along both axes. Savitzky-Golay and moving average run along
/// axis 0 (down each column), or along the row when the array has a single row.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use origami::algorithm::smoothing::{smooth_2d, SmoothingConfig};
///
/// let array = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 3.0, 6.0, 0.0, 0.0]);
/// let smoothed = smooth_2d(&array, &SmoothingConfig::moving_average(3)).unwrap();
/// assert_eq!(smoothed.shape(), (3, 2));
/// assert!((smoothed[(0, 1)] - 2.0).abs() < 1e-12);
/// ```
pub fn smooth_2d(array: &DMatrix<f64>, config: &SmoothingConfig) -> Result<DMatrix<f64>> {
    config.validate()?;
    if config.mode == SmoothingMode::None || array.is_empty() {
        return Ok(array.clone());
    }
    let kernel = Kernel::new(config)?;

    match config.mode {
        SmoothingMode::Gaussian => {
            let smoothed = smooth_columns(array, &kernel);
            Ok(smooth_rows(&smoothed, &kernel))
        }
        _ if array.nrows() == 1 => {
            if array.ncols() < config.min_length() {
                warn!("{} smoothing skipped: {} columns is shorter than the window of {}", config.mode, array.ncols(), config.window);
                return Ok(array.clone());
            }
            Ok(smooth_rows(array, &kernel))
        }
        _ => {
            if array.nrows() < config.min_length() {
                warn!("{} smoothing skipped: {} rows is shorter than the window of {}", config.mode, array.nrows(), config.window);
                return Ok(array.clone());
            }
            Ok(smooth_columns(array, &kernel))
        }
    }
}

fn smooth_columns(array: &DMatrix<f64>, kernel: &Kernel) -> DMatrix<f64> {
    let mut out = array.clone();
    for (j, column) in array.column_iter().enumerate() {
        let values: Vec<f64> = column.iter().cloned().collect();
        out.set_column(j, &DVector::from_vec(kernel.apply(&values)));
    }
    out
}

fn smooth_rows(array: &DMatrix<f64>, kernel: &Kernel) -> DMatrix<f64> {
    let mut out = array.clone();
    for (i, row) in array.row_iter().enumerate() {
        let values: Vec<f64> = row.iter().cloned().collect();
        out.set_row(i, &RowDVector::from_vec(kernel.apply(&values)));
    }
    out
}

/// Precomputed smoothing weights for one configuration.
enum Kernel {
    Identity,
    /// Symmetric weights applied with reflected boundaries
    Symmetric(Vec<f64>),
    /// Savitzky-Golay fit matrix, `polynomial + 1` rows by `window` columns
    SavitzkyGolay { fit: DMatrix<f64>, window: usize },
}

impl Kernel {
    fn new(config: &SmoothingConfig) -> Result<Self> {
        match config.mode {
            SmoothingMode::None => Ok(Kernel::Identity),
            SmoothingMode::Gaussian if config.sigma == 0.0 => Ok(Kernel::Identity),
            SmoothingMode::Gaussian => gaussian_kernel(config.sigma).map(Kernel::Symmetric),
            SmoothingMode::MovingAverage => Ok(Kernel::Symmetric(vec![1.0 / config.window as f64; config.window])),
            SmoothingMode::SavitzkyGolay => {
                let fit = savitzky_golay_fit(config.window, config.polynomial)?;
                Ok(Kernel::SavitzkyGolay { fit, window: config.window })
            }
        }
    }

    fn apply(&self, values: &[f64]) -> Vec<f64> {
        match self {
            Kernel::Identity => values.to_vec(),
            Kernel::Symmetric(weights) => convolve_reflect(values, weights),
            Kernel::SavitzkyGolay { fit, window } => savitzky_golay(values, fit, *window),
        }
    }
}

/// Normalised Gaussian weights over `[-radius, radius]`, `radius = round(4 sigma)`.
fn gaussian_kernel(sigma: f64) -> Result<Vec<f64>> {
    let normal = Normal::new(0.0, sigma).map_err(|e| ProcessingError::invalid("sigma", e.to_string()))?;
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius).map(|k| normal.pdf(k as f64)).collect();
    let total: f64 = weights.iter().sum();
    debug!("gaussian kernel: sigma {}, {} weights", sigma, weights.len());
    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Index into a signal of length `len` mirrored about its edges (`d c b a | a b c d | d c b a`).
fn reflect(index: isize, len: isize) -> usize {
    let period = 2 * len;
    let wrapped = index.rem_euclid(period);
    if wrapped >= len { (period - 1 - wrapped) as usize } else { wrapped as usize }
}

fn convolve_reflect(values: &[f64], weights: &[f64]) -> Vec<f64> {
    let len = values.len() as isize;
    let radius = (weights.len() / 2) as isize;
    (0..len)
        .map(|i| {
            weights.iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect(i + k as isize - radius, len)])
                .sum()
        })
        .collect()
}

/// Pseudo-inverse of the Vandermonde matrix over offsets `-half..=half`.
///
/// Row 0 holds the smoothing coefficients; multiplying a full window gives the polynomial fit.
fn savitzky_golay_fit(window: usize, polynomial: usize) -> Result<DMatrix<f64>> {
    let half = (window / 2) as f64;
    let design = DMatrix::from_fn(window, polynomial + 1, |i, j| (i as f64 - half).powi(j as i32));
    design
        .pseudo_inverse(1e-12)
        .map_err(|e| ProcessingError::invalid("polynomial", e.to_string()))
}

fn evaluate_polynomial(coefficients: &DVector<f64>, t: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

/// Savitzky-Golay filter; edges are evaluated from the fit to the first and last windows.
/// Negative output is clipped to zero.
fn savitzky_golay(values: &[f64], fit: &DMatrix<f64>, window: usize) -> Vec<f64> {
    let n = values.len();
    let half = window / 2;
    let mut out = vec![0.0; n];

    for i in half..n - half {
        out[i] = (0..window).map(|k| fit[(0, k)] * values[i + k - half]).sum();
    }

    let head = fit * DVector::from_column_slice(&values[..window]);
    for (i, value) in out.iter_mut().enumerate().take(half) {
        *value = evaluate_polynomial(&head, i as f64 - half as f64);
    }
    let tail_start = n - window;
    let tail = fit * DVector::from_column_slice(&values[tail_start..]);
    for (i, value) in out.iter_mut().enumerate().skip(n - half) {
        *value = evaluate_polynomial(&tail, (i - tail_start) as f64 - half as f64);
    }

    out.iter_mut().for_each(|v| *v = v.max(0.0));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_gaussian_preserves_total() {
        let values = vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let smoothed = smooth_1d(&values, &SmoothingConfig::gaussian(1.0)).unwrap();
        let total: f64 = smoothed.iter().sum();
        assert!((total - 10.0).abs() < 1e-9);
        assert!(smoothed[3] < 10.0 && smoothed[2] > 0.0);
        assert!((smoothed[2] - smoothed[4]).abs() < 1e-12);
    }

    #[test]
    fn test_negative_sigma_is_rejected() {
        let result = smooth_1d(&[1.0, 2.0], &SmoothingConfig::gaussian(-1.0));
        assert!(matches!(result, Err(ProcessingError::InvalidParameter { name: "sigma", .. })));
    }

    #[test]
    fn test_savitzky_golay_window_constraints() {
        let values = vec![1.0; 10];
        assert!(smooth_1d(&values, &SmoothingConfig::savitzky_golay(4, 2)).is_err());
        assert!(smooth_1d(&values, &SmoothingConfig::savitzky_golay(3, 3)).is_err());
        assert!(smooth_1d(&values, &SmoothingConfig::savitzky_golay(5, 2)).is_ok());
    }

    #[test]
    fn test_savitzky_golay_keeps_quadratics() {
        let values: Vec<f64> = (0..12).map(|i| 1.0 + 0.5 * i as f64 + 0.25 * (i * i) as f64).collect();
        let smoothed = smooth_1d(&values, &SmoothingConfig::savitzky_golay(5, 2)).unwrap();
        assert_close(&smoothed, &values);
    }

    #[test]
    fn test_savitzky_golay_clips_negative() {
        let values = vec![0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0];
        let smoothed = smooth_1d(&values, &SmoothingConfig::savitzky_golay(5, 2)).unwrap();
        assert!(smoothed.iter().all(|&v| v >= 0.0));
        assert!(smoothed[4] > 0.0 && smoothed[4] < 10.0);
    }

    #[test]
    fn test_short_signal_is_returned_unchanged() {
        let values = vec![1.0, 5.0, 2.0];
        let smoothed = smooth_1d(&values, &SmoothingConfig::savitzky_golay(7, 2)).unwrap();
        assert_eq!(smoothed, values);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("Savitzky-Golay".parse::<SmoothingMode>().unwrap(), SmoothingMode::SavitzkyGolay);
        assert_eq!("Moving average".parse::<SmoothingMode>().unwrap(), SmoothingMode::MovingAverage);
        assert!(matches!("Median".parse::<SmoothingMode>(), Err(ProcessingError::UnknownMode { .. })));
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn test_gaussian_2d_smooths_both_axes() {
        let mut array = DMatrix::zeros(7, 7);
        array[(3, 3)] = 49.0;
        let smoothed = smooth_2d(&array, &SmoothingConfig::gaussian(1.0)).unwrap();
        assert_eq!(smoothed.shape(), (7, 7));
        assert!(smoothed[(3, 2)] > 0.0);
        assert!(smoothed[(2, 3)] > 0.0);
        assert!((smoothed[(3, 2)] - smoothed[(2, 3)]).abs() < 1e-12);
        assert!((smoothed.sum() - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average_2d_runs_down_columns() {
        let array = DMatrix::from_row_slice(3, 3, &[0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 0.0, 0.0, 0.0]);
        let smoothed = smooth_2d(&array, &SmoothingConfig::moving_average(3)).unwrap();
        assert_close(&smoothed.column(0).iter().cloned().collect::<Vec<_>>(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_single_row_is_smoothed_along_row() {
        let array = DMatrix::from_row_slice(1, 5, &[0.0, 0.0, 3.0, 0.0, 0.0]);
        let smoothed = smooth_2d(&array, &SmoothingConfig::moving_average(3)).unwrap();
        assert_close(&smoothed.row(0).iter().cloned().collect::<Vec<_>>(), &[0.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
