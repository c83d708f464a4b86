use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::algorithm::utility::is_prime;
use crate::data::heatmap::Heatmap;
use crate::error::{ProcessingError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleMethod {
    /// Same as `BinnedSum`
    #[default]
    Auto,
    #[serde(rename = "Binned (summed)")]
    BinnedSum,
    #[serde(rename = "Binned (mean)")]
    BinnedMean,
    #[serde(rename = "Sub-sampled")]
    SubSampled,
}

impl DownsampleMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DownsampleMethod::Auto => "Auto",
            DownsampleMethod::BinnedSum => "Binned (summed)",
            DownsampleMethod::BinnedMean => "Binned (mean)",
            DownsampleMethod::SubSampled => "Sub-sampled",
        }
    }
}

impl fmt::Display for DownsampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DownsampleMethod {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Auto" => Ok(DownsampleMethod::Auto),
            "Binned (summed)" => Ok(DownsampleMethod::BinnedSum),
            "Binned (mean)" => Ok(DownsampleMethod::BinnedMean),
            "Sub-sampled" => Ok(DownsampleMethod::SubSampled),
            other => Err(ProcessingError::unknown_mode("downsampling", other)),
        }
    }
}

/// Configuration for reducing the column count of large heatmaps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownsampleConfig {
    /// Column count above which a single reduction pass is made (default: 15000)
    pub soft_max: usize,
    /// Column count the result must not exceed (default: 100000)
    pub hard_max: usize,
    /// Exclusive lower end of the division factor search (default: 1)
    pub min_search: usize,
    /// Inclusive upper end of the division factor search (default: 20)
    pub max_search: usize,
    /// Sub-sampling step used when no division factor exists (default: 5)
    pub subsample_default: usize,
    /// Reduction strategy (default: Auto)
    pub method: DownsampleMethod,
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        DownsampleConfig {
            soft_max: 15000,
            hard_max: 100000,
            min_search: 1,
            max_search: 20,
            subsample_default: 5,
            method: DownsampleMethod::Auto,
        }
    }
}

impl DownsampleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hard_max == 0 {
            return Err(ProcessingError::invalid("hard_max", "must be at least 1"));
        }
        if self.subsample_default < 2 {
            return Err(ProcessingError::invalid("subsample_default", format!("must be at least 2, got {}", self.subsample_default)));
        }
        if self.min_search == 0 {
            return Err(ProcessingError::invalid("min_search", "must be at least 1"));
        }
        if self.max_search <= self.min_search {
            return Err(ProcessingError::invalid(
                "max_search",
                format!("must be greater than min_search {}, got {}", self.min_search, self.max_search),
            ));
        }
        Ok(())
    }
}

/// Reduction factor for one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionFactor {
    pub factor: usize,
    /// `true` when `factor` divides the column count and binning is possible
    pub exact: bool,
}

/// Largest divisor of `columns` in `(min_search, max_search]`, or the sub-sampling default
/// when `columns` is prime or has no such divisor.
///
/// # Examples
///
/// ```
/// use origami::algorithm::downsample::{division_factor, DownsampleConfig};
///
/// let config = DownsampleConfig::default();
/// assert_eq!(division_factor(36, &config).factor, 18);
/// assert!(!division_factor(37, &config).exact);
/// assert_eq!(division_factor(37, &config).factor, 5);
/// ```
pub fn division_factor(columns: usize, config: &DownsampleConfig) -> DivisionFactor {
    let fallback = DivisionFactor { factor: config.subsample_default, exact: false };
    if is_prime(columns) {
        debug!("{} columns is prime, sub-sampling by {}", columns, config.subsample_default);
        return fallback;
    }
    match (config.min_search + 1..=config.max_search).rev().find(|&f| columns % f == 0) {
        Some(factor) => DivisionFactor { factor, exact: true },
        None => {
            debug!(
                "no division factor for {} columns in ({}, {}], sub-sampling by {}",
                columns, config.min_search, config.max_search, config.subsample_default
            );
            fallback
        }
    }
}

/// Keeps every `factor`-th column.
pub fn subsample(heatmap: &Heatmap, factor: usize) -> Heatmap {
    let factor = factor.max(1);
    let columns: Vec<usize> = (0..heatmap.ncols()).step_by(factor).collect();
    let array = heatmap.array.select_columns(columns.iter());
    let x = columns.iter().map(|&c| heatmap.x[c]).collect();
    Heatmap::from_parts(array, x, heatmap.y.clone())
}

/// Sums consecutive groups of `factor` columns; `x` becomes the mean of each group.
///
/// Trailing columns that do not fill a whole group are dropped.
pub fn bin_sum(heatmap: &Heatmap, factor: usize) -> Heatmap {
    bin_columns(heatmap, factor, false)
}

/// Averages consecutive groups of `factor` columns; `x` becomes the mean of each group.
pub fn bin_mean(heatmap: &Heatmap, factor: usize) -> Heatmap {
    bin_columns(heatmap, factor, true)
}

fn bin_columns(heatmap: &Heatmap, factor: usize, mean: bool) -> Heatmap {
    let factor = factor.max(1);
    let new_cols = heatmap.ncols() / factor;
    let scale = if mean { 1.0 / factor as f64 } else { 1.0 };
    let array = DMatrix::from_fn(heatmap.nrows(), new_cols, |r, c| {
        (0..factor).map(|k| heatmap.array[(r, c * factor + k)]).sum::<f64>() * scale
    });
    let x = heatmap.x
        .chunks_exact(factor)
        .map(|group| group.iter().sum::<f64>() / factor as f64)
        .collect();
    Heatmap::from_parts(array, x, heatmap.y.clone())
}

/// Result of [`downsample`].
#[derive(Clone, Debug, PartialEq)]
pub struct DownsampleOutcome {
    pub heatmap: Heatmap,
    /// Number of reduction passes, 0 when the input was small enough
    pub passes: usize,
    /// Factor used by every pass
    pub factors: Vec<DivisionFactor>,
}

fn reduce(heatmap: &Heatmap, config: &DownsampleConfig) -> (Heatmap, DivisionFactor) {
    let division = division_factor(heatmap.ncols(), config);
    let reduced = if !division.exact || config.method == DownsampleMethod::SubSampled {
        subsample(heatmap, division.factor)
    } else if config.method == DownsampleMethod::BinnedMean {
        bin_mean(heatmap, division.factor)
    } else {
        bin_sum(heatmap, division.factor)
    };
    (reduced, division)
}

/// Reduces the column count of a heatmap.
///
/// One pass is made when the column count exceeds `soft_max` (or `hard_max`); further passes
/// follow while it still exceeds `hard_max`. Every pass divides the column count by at least 2,
/// so at most `ceil(log2(columns)) + 1` passes are made.
///
/// # Errors
///
/// `InvalidParameter` for `hard_max == 0`, `subsample_default < 2`, `min_search == 0`
/// or `max_search <= min_search`.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use origami::algorithm::downsample::{downsample, DownsampleConfig};
/// use origami::data::heatmap::Heatmap;
///
/// let heatmap = Heatmap::from_array(DMatrix::from_element(2, 40, 1.0));
/// let config = DownsampleConfig { soft_max: 10, hard_max: 30, ..Default::default() };
/// let outcome = downsample(&heatmap, &config).unwrap();
/// assert_eq!(outcome.heatmap.ncols(), 2);
/// assert_eq!(outcome.passes, 1);
/// assert_eq!(outcome.heatmap.array.sum(), 80.0);
/// ```
pub fn downsample(heatmap: &Heatmap, config: &DownsampleConfig) -> Result<DownsampleOutcome> {
    config.validate()?;
    let original = heatmap.ncols();
    let mut current = heatmap.clone();
    let mut factors = Vec::new();

    if original > config.soft_max || original > config.hard_max {
        let (reduced, division) = reduce(&current, config);
        current = reduced;
        factors.push(division);
    }

    let max_passes = (original.max(1) as f64).log2().ceil() as usize + 1;
    while current.ncols() > config.hard_max && factors.len() < max_passes {
        warn!("{} columns still above the hard maximum of {}, reducing again", current.ncols(), config.hard_max);
        let (reduced, division) = reduce(&current, config);
        current = reduced;
        factors.push(division);
    }

    if !factors.is_empty() {
        info!("downsampled from {:?} to {:?} in {} pass(es)", heatmap.shape(), current.shape(), factors.len());
    }
    Ok(DownsampleOutcome { heatmap: current, passes: factors.len(), factors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> Heatmap {
        let array = DMatrix::from_fn(rows, cols, |r, c| (r * cols + c) as f64);
        Heatmap::from_array(array)
    }

    #[test]
    fn test_subsample_keeps_every_nth() {
        let heatmap = ramp(1, 7);
        let reduced = subsample(&heatmap, 3);
        assert_eq!(reduced.x, vec![0.0, 3.0, 6.0]);
        assert_eq!(reduced.array.as_slice(), &[0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_bin_sum_and_mean() {
        let heatmap = ramp(2, 4);
        let summed = bin_sum(&heatmap, 2);
        assert_eq!(summed.shape(), (2, 2));
        assert_eq!(summed.array, DMatrix::from_row_slice(2, 2, &[1.0, 5.0, 9.0, 13.0]));
        assert_eq!(summed.x, vec![0.5, 2.5]);
        let averaged = bin_mean(&heatmap, 2);
        assert_eq!(averaged.array, DMatrix::from_row_slice(2, 2, &[0.5, 2.5, 4.5, 6.5]));
    }

    #[test]
    fn test_small_heatmap_is_untouched() {
        let heatmap = ramp(3, 10);
        let outcome = downsample(&heatmap, &DownsampleConfig::default()).unwrap();
        assert_eq!(outcome.passes, 0);
        assert_eq!(outcome.heatmap, heatmap);
    }

    #[test]
    fn test_prime_columns_fall_back_to_subsampling() {
        let heatmap = ramp(1, 97);
        let config = DownsampleConfig { soft_max: 50, hard_max: 60, ..Default::default() };
        let outcome = downsample(&heatmap, &config).unwrap();
        assert_eq!(outcome.factors[0], DivisionFactor { factor: 5, exact: false });
        assert_eq!(outcome.heatmap.ncols(), 20);
    }

    #[test]
    fn test_repeats_until_below_hard_max() {
        let heatmap = ramp(1, 1000);
        let config = DownsampleConfig { soft_max: 5, hard_max: 5, max_search: 4, ..Default::default() };
        let outcome = downsample(&heatmap, &config).unwrap();
        assert!(outcome.heatmap.ncols() <= 5);
        assert!(outcome.passes > 1);
        assert!(outcome.passes <= 11);
    }

    #[test]
    fn test_method_selection() {
        let heatmap = ramp(1, 40);
        let config = DownsampleConfig { soft_max: 10, hard_max: 100, method: DownsampleMethod::SubSampled, ..Default::default() };
        let outcome = downsample(&heatmap, &config).unwrap();
        assert_eq!(outcome.heatmap.x, vec![0.0, 20.0]);
        let config = DownsampleConfig { method: DownsampleMethod::BinnedMean, ..config };
        let outcome = downsample(&heatmap, &config).unwrap();
        assert_eq!(outcome.heatmap.x, vec![9.5, 29.5]);
    }

    #[test]
    fn test_invalid_configs() {
        let heatmap = ramp(1, 4);
        for config in [
            DownsampleConfig { hard_max: 0, ..Default::default() },
            DownsampleConfig { subsample_default: 1, ..Default::default() },
            DownsampleConfig { min_search: 5, max_search: 5, ..Default::default() },
        ] {
            assert!(matches!(downsample(&heatmap, &config), Err(ProcessingError::InvalidParameter { .. })));
        }
    }

    #[test]
    fn test_method_names() {
        assert_eq!("Binned (mean)".parse::<DownsampleMethod>().unwrap(), DownsampleMethod::BinnedMean);
        assert!("Binned".parse::<DownsampleMethod>().is_err());
    }
}
