use std::fmt;
use std::str::FromStr;

use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::algorithm::utility::max_value;
use crate::error::{ProcessingError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Maximum becomes 1.0
    #[default]
    Maximum,
    /// Sum becomes 1.0
    Total,
    /// Maximum becomes 100.0
    Percentage,
}

impl NormalizationMode {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationMode::Maximum => "Maximum",
            NormalizationMode::Total => "Total",
            NormalizationMode::Percentage => "Percentage",
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NormalizationMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Maximum" => Ok(NormalizationMode::Maximum),
            "Total" => Ok(NormalizationMode::Total),
            "Percentage" => Ok(NormalizationMode::Percentage),
            other => Err(ProcessingError::unknown_mode("normalization", other)),
        }
    }
}

/// Whether a 2D array is scaled as a whole or column by column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationScope {
    Global,
    #[default]
    Columns,
}

/// Configuration for normalization
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Scaling target (default: Maximum)
    pub mode: NormalizationMode,
    /// 2D only: scale each column independently or the whole array (default: Columns)
    pub scope: NormalizationScope,
}

impl NormalizationConfig {
    pub fn new(mode: NormalizationMode) -> Self {
        NormalizationConfig { mode, ..Default::default() }
    }
}

/// Divisor and multiplier for `values`, `None` when there is nothing to scale.
fn scaling(values: &[f64], mode: NormalizationMode) -> Option<(f64, f64)> {
    let (divisor, multiplier) = match mode {
        NormalizationMode::Maximum => (max_value(values)?, 1.0),
        NormalizationMode::Total => (values.iter().filter(|v| v.is_finite()).sum(), 1.0),
        NormalizationMode::Percentage => (max_value(values)?, 100.0),
    };
    if divisor > 0.0 && divisor.is_finite() { Some((divisor, multiplier)) } else { None }
}

fn scale_in_place(values: &mut [f64], mode: NormalizationMode) -> bool {
    match scaling(values, mode) {
        Some((divisor, multiplier)) => {
            values.iter_mut().for_each(|v| *v = *v / divisor * multiplier);
            true
        }
        None => false,
    }
}

/// Rescales a 1D signal.
///
/// All-zero and empty inputs are returned unchanged.
///
/// # Examples
///
/// ```
/// use origami::algorithm::normalize::{normalize_1d, NormalizationConfig, NormalizationMode};
///
/// let values = vec![1.0, 4.0, 2.0];
/// let normalized = normalize_1d(&values, &NormalizationConfig::new(NormalizationMode::Maximum));
/// assert_eq!(normalized, vec![0.25, 1.0, 0.5]);
///
/// let percentage = normalize_1d(&values, &NormalizationConfig::new(NormalizationMode::Percentage));
/// assert_eq!(percentage, vec![25.0, 100.0, 50.0]);
/// ```
pub fn normalize_1d(values: &[f64], config: &NormalizationConfig) -> Vec<f64> {
    let mut out = values.to_vec();
    if !scale_in_place(&mut out, config.mode) {
        debug!("{} normalization skipped: nothing to scale", config.mode);
    }
    out
}

/// Rescales a 2D array globally or per column.
///
/// All-zero columns (or an all-zero array) are left unchanged.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use origami::algorithm::normalize::{normalize_2d, NormalizationConfig};
///
/// let array = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 4.0, 0.0]);
/// let normalized = normalize_2d(&array, &NormalizationConfig::default());
/// assert_eq!(normalized.as_slice(), &[0.25, 1.0, 0.0, 0.0]);
/// ```
pub fn normalize_2d(array: &DMatrix<f64>, config: &NormalizationConfig) -> DMatrix<f64> {
    let mut out = array.clone();
    match config.scope {
        NormalizationScope::Global => {
            if !scale_in_place(out.as_mut_slice(), config.mode) {
                debug!("{} normalization skipped: nothing to scale", config.mode);
            }
        }
        NormalizationScope::Columns => {
            let nrows = out.nrows();
            if nrows > 0 {
                let skipped = out.as_mut_slice()
                    .chunks_mut(nrows)
                    .map(|column| scale_in_place(column, config.mode))
                    .filter(|scaled| !scaled)
                    .count();
                debug!("{} normalization per column, {} empty column(s) left unchanged", config.mode, skipped);
            }
        }
    }
    out
}
