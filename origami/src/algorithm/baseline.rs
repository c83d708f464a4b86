use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::algorithm::utility::max_value;
use crate::error::{ProcessingError, Result};

/// How the baseline level is derived and removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Values below an absolute threshold become 0, values equal to it are kept
    #[default]
    Threshold,
    /// Values below `threshold * max` become 0
    Relative,
    /// The threshold is subtracted from every value, clipped at 0
    Subtract,
    /// The array minimum is subtracted from every value
    Minimum,
}

impl BaselineMode {
    pub fn name(&self) -> &'static str {
        match self {
            BaselineMode::Threshold => "Threshold",
            BaselineMode::Relative => "Relative",
            BaselineMode::Subtract => "Subtract",
            BaselineMode::Minimum => "Minimum",
        }
    }
}

impl fmt::Display for BaselineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BaselineMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Threshold" => Ok(BaselineMode::Threshold),
            "Relative" => Ok(BaselineMode::Relative),
            "Subtract" => Ok(BaselineMode::Subtract),
            "Minimum" => Ok(BaselineMode::Minimum),
            other => Err(ProcessingError::unknown_mode("baseline", other)),
        }
    }
}

/// Configuration for baseline removal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Baseline strategy (default: Threshold)
    pub mode: BaselineMode,
    /// Absolute threshold, or a fraction of the maximum in `Relative` mode (default: 0.0)
    pub threshold: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig { mode: BaselineMode::Threshold, threshold: 0.0 }
    }
}

impl BaselineConfig {
    pub fn new(mode: BaselineMode, threshold: f64) -> Self {
        BaselineConfig { mode, threshold }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(ProcessingError::invalid("threshold", format!("must be a non-negative number, got {}", self.threshold)));
        }
        if self.mode == BaselineMode::Relative && self.threshold > 1.0 {
            return Err(ProcessingError::invalid("threshold", format!("relative threshold must be within [0, 1], got {}", self.threshold)));
        }
        Ok(())
    }
}

/// Removes the baseline from a 1D signal.
///
/// # Errors
///
/// `InvalidParameter` for a negative or non-finite threshold, or a relative threshold above 1.
///
/// # Examples
///
/// ```
/// use origami::algorithm::baseline::{subtract_baseline_1d, BaselineConfig, BaselineMode};
///
/// let values = vec![1.0, 5.0, 2.0, 8.0];
/// let cleaned = subtract_baseline_1d(&values, &BaselineConfig::new(BaselineMode::Threshold, 2.0)).unwrap();
/// assert_eq!(cleaned, vec![0.0, 5.0, 2.0, 8.0]);
///
/// let shifted = subtract_baseline_1d(&values, &BaselineConfig::new(BaselineMode::Subtract, 2.0)).unwrap();
/// assert_eq!(shifted, vec![0.0, 3.0, 0.0, 6.0]);
/// ```
pub fn subtract_baseline_1d(values: &[f64], config: &BaselineConfig) -> Result<Vec<f64>> {
    config.validate()?;
    Ok(remove_baseline(values, config))
}

/// Removes the baseline from every value of a 2D array.
pub fn subtract_baseline_2d(array: &DMatrix<f64>, config: &BaselineConfig) -> Result<DMatrix<f64>> {
    config.validate()?;
    let values = remove_baseline(array.as_slice(), config);
    Ok(DMatrix::from_vec(array.nrows(), array.ncols(), values))
}

fn remove_baseline(values: &[f64], config: &BaselineConfig) -> Vec<f64> {
    let max = match max_value(values) {
        Some(max) => max,
        None => return values.to_vec(),
    };

    match config.mode {
        BaselineMode::Threshold | BaselineMode::Relative => {
            let threshold = if config.mode == BaselineMode::Relative { config.threshold * max } else { config.threshold };
            if threshold > max {
                warn!("baseline threshold {} is above the maximum value {}, every value will be removed", threshold, max);
            }
            debug!("removing values < {}", threshold);
            values.iter().map(|&v| if v < threshold { 0.0 } else { v }).collect()
        }
        BaselineMode::Subtract => {
            if config.threshold > max {
                warn!("baseline threshold {} is above the maximum value {}, every value will be removed", config.threshold, max);
            }
            values.iter().map(|&v| (v - config.threshold).max(0.0)).collect()
        }
        BaselineMode::Minimum => {
            let floor = values.iter().cloned().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
            debug!("subtracting array minimum {}", floor);
            values.iter().map(|&v| v - floor).collect()
        }
    }
}

/// Clips a 2D array to an intensity window given as fractions of its maximum.
///
/// Values `<= min_fraction * max` become 0 and values `>= max_fraction * max` become `max`.
/// Reversed bounds are swapped; equal bounds leave the array unchanged.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use origami::algorithm::baseline::clip_intensity_range;
///
/// let array = DMatrix::from_row_slice(1, 4, &[1.0, 3.0, 6.0, 10.0]);
/// let clipped = clip_intensity_range(&array, 0.2, 0.5).unwrap();
/// assert_eq!(clipped.as_slice(), &[0.0, 3.0, 10.0, 10.0]);
/// ```
pub fn clip_intensity_range(array: &DMatrix<f64>, min_fraction: f64, max_fraction: f64) -> Result<DMatrix<f64>> {
    if !min_fraction.is_finite() || !max_fraction.is_finite() {
        return Err(ProcessingError::invalid("intensity range", format!("fractions must be finite, got [{}, {}]", min_fraction, max_fraction)));
    }
    let (low, high) = if min_fraction > max_fraction {
        warn!("minimum intensity fraction {} is above the maximum {}, swapping", min_fraction, max_fraction);
        (max_fraction, min_fraction)
    } else {
        (min_fraction, max_fraction)
    };
    if low == high {
        return Ok(array.clone());
    }
    let max = match max_value(array.as_slice()) {
        Some(max) => max,
        None => return Ok(array.clone()),
    };
    let (low, high) = (low * max, high * max);
    Ok(array.map(|v| if v <= low { 0.0 } else if v >= high { max } else { v }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_threshold() {
        let values = vec![1.0, 5.0, 10.0, 4.0];
        let cleaned = subtract_baseline_1d(&values, &BaselineConfig::new(BaselineMode::Relative, 0.5)).unwrap();
        assert_eq!(cleaned, vec![0.0, 5.0, 10.0, 0.0]);
    }

    #[test]
    fn test_relative_threshold_above_one_is_rejected() {
        let result = subtract_baseline_1d(&[1.0], &BaselineConfig::new(BaselineMode::Relative, 1.5));
        assert!(matches!(result, Err(ProcessingError::InvalidParameter { .. })));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let result = subtract_baseline_1d(&[1.0], &BaselineConfig::new(BaselineMode::Threshold, -1.0));
        assert!(matches!(result, Err(ProcessingError::InvalidParameter { .. })));
    }

    #[test]
    fn test_value_equal_to_threshold_is_kept() {
        let cleaned = subtract_baseline_1d(&[2.0, 1.999, 3.0], &BaselineConfig::new(BaselineMode::Threshold, 2.0)).unwrap();
        assert_eq!(cleaned, vec![2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_threshold_above_max_clears_everything() {
        let cleaned = subtract_baseline_1d(&[1.0, 2.0], &BaselineConfig::new(BaselineMode::Threshold, 5.0)).unwrap();
        assert_eq!(cleaned, vec![0.0, 0.0]);
    }

    #[test]
    fn test_minimum_floor() {
        let cleaned = subtract_baseline_1d(&[3.0, 5.0, 4.0], &BaselineConfig::new(BaselineMode::Minimum, 0.0)).unwrap();
        assert_eq!(cleaned, vec![0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_2d_keeps_shape() {
        let array = DMatrix::from_row_slice(2, 2, &[1.0, 4.0, 3.0, 0.5]);
        let cleaned = subtract_baseline_2d(&array, &BaselineConfig::new(BaselineMode::Threshold, 1.0)).unwrap();
        assert_eq!(cleaned, DMatrix::from_row_slice(2, 2, &[1.0, 4.0, 3.0, 0.0]));
    }

    #[test]
    fn test_clip_swaps_and_equal_bounds() {
        let array = DMatrix::from_row_slice(1, 4, &[1.0, 3.0, 6.0, 10.0]);
        assert_eq!(clip_intensity_range(&array, 0.5, 0.2).unwrap(), clip_intensity_range(&array, 0.2, 0.5).unwrap());
        assert_eq!(clip_intensity_range(&array, 0.3, 0.3).unwrap(), array);
    }

    #[test]
    fn test_empty_input() {
        assert!(subtract_baseline_1d(&[], &BaselineConfig::default()).unwrap().is_empty());
    }
}
