use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::algorithm::utility::nearest_index;
use crate::data::spectrum::Spectrum;
use crate::error::{ProcessingError, Result};

/// Target axis and redistribution strategy for [`linearize`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearizationMode {
    /// Uniform axis, intensities integrated into neighbouring bins
    #[default]
    #[serde(rename = "Linear m/z")]
    LinearMz,
    /// Constant-resolution axis, intensities integrated into neighbouring bins
    #[serde(rename = "Linear resolution")]
    LinearResolution,
    /// Uniform axis, intensities linearly interpolated
    #[serde(rename = "Linear interpolation")]
    LinearInterpolation,
    /// Constant-resolution axis, intensities linearly interpolated
    #[serde(rename = "Linear resolution interpolation")]
    LinearResolutionInterpolation,
}

impl LinearizationMode {
    pub fn name(&self) -> &'static str {
        match self {
            LinearizationMode::LinearMz => "Linear m/z",
            LinearizationMode::LinearResolution => "Linear resolution",
            LinearizationMode::LinearInterpolation => "Linear interpolation",
            LinearizationMode::LinearResolutionInterpolation => "Linear resolution interpolation",
        }
    }

    fn uniform_axis(&self) -> bool {
        matches!(self, LinearizationMode::LinearMz | LinearizationMode::LinearInterpolation)
    }

    fn integrates(&self) -> bool {
        matches!(self, LinearizationMode::LinearMz | LinearizationMode::LinearResolution)
    }
}

impl fmt::Display for LinearizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinearizationMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Linear m/z" => Ok(LinearizationMode::LinearMz),
            "Linear resolution" => Ok(LinearizationMode::LinearResolution),
            "Linear interpolation" => Ok(LinearizationMode::LinearInterpolation),
            "Linear resolution interpolation" => Ok(LinearizationMode::LinearResolutionInterpolation),
            other => Err(ProcessingError::unknown_mode("linearization", other)),
        }
    }
}

/// Configuration for spectrum linearization
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearizationConfig {
    /// Axis type and redistribution strategy (default: Linear m/z)
    pub mode: LinearizationMode,
    /// Spacing of the new axis; for constant-resolution axes the spacing at the first bin (default: 0.01)
    pub bin_size: f64,
    /// Take the axis range from the data instead of `x_min`/`x_max` (default: true)
    pub auto_range: bool,
    /// Lower axis bound when `auto_range` is off (default: 500.0)
    pub x_min: f64,
    /// Upper axis bound when `auto_range` is off (default: 8000.0)
    pub x_max: f64,
}

impl Default for LinearizationConfig {
    fn default() -> Self {
        LinearizationConfig {
            mode: LinearizationMode::LinearMz,
            bin_size: 0.01,
            auto_range: true,
            x_min: 500.0,
            x_max: 8000.0,
        }
    }
}

impl LinearizationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.bin_size.is_finite() && self.bin_size > 0.0) {
            return Err(ProcessingError::invalid("bin_size", format!("must be a positive number, got {}", self.bin_size)));
        }
        if !self.auto_range {
            check_range(self.x_min, self.x_max)?;
        }
        Ok(())
    }
}

fn check_range(start: f64, end: f64) -> Result<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(ProcessingError::invalid("x range", format!("bounds must be finite, got [{}, {}]", start, end)));
    }
    if end <= start {
        return Err(ProcessingError::invalid("x range", format!("end {} must be greater than start {}", end, start)));
    }
    Ok(())
}

/// Uniform axis `start, start + bin, ...` strictly below `end`.
///
/// # Examples
///
/// ```
/// use origami::algorithm::linearize::linear_axis;
///
/// let axis = linear_axis(0.0, 1.0, 0.25).unwrap();
/// assert_eq!(axis, vec![0.0, 0.25, 0.5, 0.75]);
/// ```
pub fn linear_axis(start: f64, end: f64, bin_size: f64) -> Result<Vec<f64>> {
    check_range(start, end)?;
    if !(bin_size.is_finite() && bin_size > 0.0) {
        return Err(ProcessingError::invalid("bin_size", format!("must be a positive number, got {}", bin_size)));
    }
    let n = ((end - start) / bin_size).ceil() as usize;
    let axis: Vec<f64> = (0..n).map(|i| start + bin_size * i as f64).filter(|&v| v < end).collect();
    check_axis_length(&axis)?;
    Ok(axis)
}

/// Axis with constant resolution `start / bin_size`: `x[k + 1] = x[k] * (1 + bin_size / start)`.
///
/// # Examples
///
/// ```
/// use origami::algorithm::linearize::nonlinear_axis;
///
/// let axis = nonlinear_axis(100.0, 130.0, 10.0).unwrap();
/// assert_eq!(axis.len(), 3);
/// assert!((axis[2] - 121.0).abs() < 1e-9);
/// ```
pub fn nonlinear_axis(start: f64, end: f64, bin_size: f64) -> Result<Vec<f64>> {
    check_range(start, end)?;
    if !(bin_size.is_finite() && bin_size > 0.0) {
        return Err(ProcessingError::invalid("bin_size", format!("must be a positive number, got {}", bin_size)));
    }
    if start <= 0.0 {
        return Err(ProcessingError::invalid("x range", format!("constant resolution axis needs a positive start, got {}", start)));
    }
    let step = bin_size / start;
    let mut axis = vec![start];
    let mut value = start * (1.0 + step);
    while value < end {
        axis.push(value);
        value *= 1.0 + step;
    }
    check_axis_length(&axis)?;
    Ok(axis)
}

fn check_axis_length(axis: &[f64]) -> Result<()> {
    if axis.len() < 2 {
        return Err(ProcessingError::invalid(
            "bin_size",
            format!("axis would have {} bin(s), at least 2 are needed", axis.len()),
        ));
    }
    Ok(())
}

/// Rebins a spectrum onto a uniform or constant-resolution axis.
///
/// # Arguments
///
/// * `spectrum` - x-ascending input signal.
/// * `config` - Axis type, bin size and range.
///
/// # Errors
///
/// `InvalidParameter` for a non-positive bin size, an invalid range, or an axis with fewer than two bins.
///
/// With `auto_range` the axis starts at the first x value and runs until it covers the last one.
///
/// # Examples
///
/// ```
/// use origami::algorithm::linearize::{linearize, LinearizationConfig};
/// use origami::data::spectrum::Spectrum;
///
/// let spectrum = Spectrum::new(vec![1.0, 1.5, 2.0, 2.5, 3.0], vec![1.0, 2.0, 3.0, 2.0, 1.0]).unwrap();
/// let config = LinearizationConfig { bin_size: 0.5, auto_range: false, x_min: 0.0, x_max: 4.0, ..Default::default() };
/// let linear = linearize(&spectrum, &config).unwrap();
/// assert_eq!(linear.len(), 8);
/// assert!((linear.total_intensity() - spectrum.total_intensity()).abs() < 1e-9);
/// ```
pub fn linearize(spectrum: &Spectrum, config: &LinearizationConfig) -> Result<Spectrum> {
    config.validate()?;
    if spectrum.is_empty() {
        return Ok(Spectrum::default());
    }

    let (start, end) = if config.auto_range {
        let (first, last) = (spectrum.x[0], spectrum.x[spectrum.len() - 1]);
        if last <= first {
            return Err(ProcessingError::invalid("x range", "automatic range needs at least two distinct x values"));
        }
        // one bin past the last point so the axis covers it
        let end = if config.mode.uniform_axis() {
            last + config.bin_size
        } else {
            last * (1.0 + config.bin_size / first)
        };
        (first, end)
    } else {
        (config.x_min, config.x_max)
    };

    let mut axis = if config.mode.uniform_axis() {
        linear_axis(start, end, config.bin_size)?
    } else {
        nonlinear_axis(start, end, config.bin_size)?
    };
    if config.auto_range {
        extend_to(&mut axis, spectrum.x[spectrum.len() - 1], config.mode.uniform_axis(), config.bin_size);
    }

    debug!("linearizing {} points onto {} bins ({}, [{}, {}))", spectrum.len(), axis.len(), config.mode, start, end);

    Ok(linearize_onto(spectrum, axis, config.mode))
}

/// Appends bins until the axis reaches `last`.
fn extend_to(axis: &mut Vec<f64>, last: f64, uniform: bool, bin_size: f64) {
    let ratio = match axis.first() {
        Some(&first) => 1.0 + bin_size / first,
        None => return,
    };
    while let Some(&tail) = axis.last() {
        if tail >= last {
            break;
        }
        axis.push(if uniform { tail + bin_size } else { tail * ratio });
    }
}

/// Redistributes a spectrum onto a precomputed ascending axis.
pub fn linearize_onto(spectrum: &Spectrum, axis: Vec<f64>, mode: LinearizationMode) -> Spectrum {
    let y = if mode.integrates() {
        integrate(&spectrum.x, &spectrum.y, &axis)
    } else {
        interpolate(&spectrum.x, &spectrum.y, &axis)
    };
    Spectrum::from_parts(axis, y)
}

/// Splits every point inside the axis between its two nearest bins, proportionally to distance.
fn integrate(x: &[f64], y: &[f64], axis: &[f64]) -> Vec<f64> {
    let mut binned = vec![0.0; axis.len()];
    let (first, last) = match (axis.first(), axis.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return binned,
    };

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        if xi < first || xi > last {
            continue;
        }
        let index = match nearest_index(axis, xi) {
            Some(index) => index,
            None => continue,
        };
        let neighbour = if axis[index] < xi {
            index + 1
        } else if axis[index] > xi {
            index - 1
        } else {
            binned[index] += yi;
            continue;
        };
        let fraction = (xi - axis[index]) / (axis[neighbour] - axis[index]);
        binned[index] += (1.0 - fraction) * yi;
        binned[neighbour] += fraction * yi;
    }
    binned
}

/// Linear interpolation at each axis value, zero outside the data.
fn interpolate(x: &[f64], y: &[f64], axis: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return vec![0.0; axis.len()];
    }
    let (first, last) = (x[0], x[x.len() - 1]);
    axis.iter()
        .map(|&value| {
            if value < first || value > last {
                return 0.0;
            }
            let i = x.partition_point(|&v| v < value);
            if i < x.len() && x[i] == value {
                return y[i];
            }
            if i == 0 {
                return y[0];
            }
            let (x0, x1) = (x[i - 1], x[i]);
            let (y0, y1) = (y[i - 1], y[i]);
            y0 + (y1 - y0) * (value - x0) / (x1 - x0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip() {
        for mode in [
            LinearizationMode::LinearMz,
            LinearizationMode::LinearResolution,
            LinearizationMode::LinearInterpolation,
            LinearizationMode::LinearResolutionInterpolation,
        ] {
            assert_eq!(mode.name().parse::<LinearizationMode>().unwrap(), mode);
        }
        assert!(matches!("Binning".parse::<LinearizationMode>(), Err(ProcessingError::UnknownMode { .. })));
    }

    #[test]
    fn test_zero_bin_size_is_rejected() {
        let spectrum = Spectrum::new(vec![1.0, 2.0], vec![1.0, 1.0]).unwrap();
        let config = LinearizationConfig { bin_size: 0.0, ..Default::default() };
        assert!(matches!(linearize(&spectrum, &config), Err(ProcessingError::InvalidParameter { .. })));
    }

    #[test]
    fn test_single_bin_axis_is_rejected() {
        let spectrum = Spectrum::new(vec![1.0, 2.0], vec![1.0, 1.0]).unwrap();
        let config = LinearizationConfig { bin_size: 5.0, auto_range: false, x_min: 1.0, x_max: 2.0, ..Default::default() };
        assert!(matches!(linearize(&spectrum, &config), Err(ProcessingError::InvalidParameter { .. })));
    }

    #[test]
    fn test_auto_range_covers_last_point() {
        let spectrum = Spectrum::new(vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]).unwrap();
        let config = LinearizationConfig { bin_size: 0.5, ..Default::default() };
        let linear = linearize(&spectrum, &config).unwrap();
        assert_eq!(linear.x, vec![1.0, 1.5, 2.0, 2.5, 3.0]);
        assert_eq!(linear.y, vec![1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_auto_range_resolution_axis_keeps_intensity() {
        let spectrum = Spectrum::new(vec![100.0, 104.3, 117.9], vec![2.0, 5.0, 3.0]).unwrap();
        let config = LinearizationConfig { mode: LinearizationMode::LinearResolution, bin_size: 1.0, ..Default::default() };
        let linear = linearize(&spectrum, &config).unwrap();
        assert!(*linear.x.last().unwrap() >= 117.9);
        assert!((linear.total_intensity() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_integration_splits_between_neighbours() {
        let spectrum = Spectrum::new(vec![1.25], vec![4.0]).unwrap();
        let y = integrate(&spectrum.x, &spectrum.y, &[1.0, 1.5, 2.0]);
        assert_eq!(y, vec![2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_integration_drops_points_outside_axis() {
        let y = integrate(&[0.5, 1.0, 3.0], &[1.0, 2.0, 5.0], &[1.0, 1.5, 2.0]);
        assert_eq!(y, vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_interpolation_zero_outside_data() {
        let spectrum = Spectrum::new(vec![1.0, 2.0, 3.0], vec![0.0, 10.0, 0.0]).unwrap();
        let config = LinearizationConfig {
            mode: LinearizationMode::LinearInterpolation,
            bin_size: 0.5,
            auto_range: false,
            x_min: 0.0,
            x_max: 4.0,
        };
        let linear = linearize(&spectrum, &config).unwrap();
        assert_eq!(linear.x, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);
        assert_eq!(linear.y, vec![0.0, 0.0, 0.0, 5.0, 10.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_resolution_axis_needs_positive_start() {
        assert!(nonlinear_axis(0.0, 10.0, 0.1).is_err());
    }

    #[test]
    fn test_empty_spectrum() {
        let linear = linearize(&Spectrum::default(), &LinearizationConfig::default()).unwrap();
        assert!(linear.is_empty());
    }
}
