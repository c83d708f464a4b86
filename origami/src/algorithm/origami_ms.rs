use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::algorithm::utility::linspace;
use crate::data::heatmap::Heatmap;
use crate::data::spectrum::Spectrum;
use crate::error::{ProcessingError, Result};

/// Upper bound on the number of steps of a generated voltage ramp.
pub const MAX_VOLTAGE_STEPS: usize = 100_000;

/// How the number of scans per collision voltage was chosen during acquisition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMethod {
    /// Same number of scans at every voltage
    #[default]
    Linear,
    /// Scan count grows exponentially above a voltage threshold
    Exponential,
    /// Scan count follows a Boltzmann sigmoid of the voltage
    Boltzmann,
    /// Explicit list of (scans, voltage) pairs
    #[serde(rename = "User-defined")]
    UserDefined,
}

impl AcquisitionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionMethod::Linear => "Linear",
            AcquisitionMethod::Exponential => "Exponential",
            AcquisitionMethod::Boltzmann => "Boltzmann",
            AcquisitionMethod::UserDefined => "User-defined",
        }
    }
}

impl fmt::Display for AcquisitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AcquisitionMethod {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Linear" => Ok(AcquisitionMethod::Linear),
            "Exponential" => Ok(AcquisitionMethod::Exponential),
            "Boltzmann" => Ok(AcquisitionMethod::Boltzmann),
            "User-defined" => Ok(AcquisitionMethod::UserDefined),
            other => Err(ProcessingError::unknown_mode("acquisition", other)),
        }
    }
}

/// Parameters of an ORIGAMI-MS acquisition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrigamiMsConfig {
    /// Scan-count model (default: Linear)
    pub method: AcquisitionMethod,
    /// First scan of the ramp, numbered from 1 (default: 1)
    pub start_scan: usize,
    /// Collision voltage of the first step (default: 4.0)
    pub start_voltage: f64,
    /// Collision voltage of the last step (default: 200.0)
    pub end_voltage: f64,
    /// Voltage increment between steps (default: 2.0)
    pub step_voltage: f64,
    /// Scans acquired at each voltage, the base count for non-linear methods (default: 3)
    pub scans_per_voltage: usize,
    /// Exponential: accumulator increment per step above the threshold (default: 0.01)
    pub exponential_increment: f64,
    /// Exponential: threshold as a percentage of `end_voltage` (default: 50.0)
    pub exponential_percentage: f64,
    /// Boltzmann: sigmoid width `dx` (default: 10.0)
    pub boltzmann_offset: f64,
    /// Boltzmann: initial plateau `A1` (default: 2.0)
    pub boltzmann_a1: f64,
    /// Boltzmann: final plateau `A2` (default: 0.07)
    pub boltzmann_a2: f64,
    /// Boltzmann: sigmoid centre `x0` (default: 47.0)
    pub boltzmann_x0: f64,
    /// User-defined: `(scans, voltage)` pairs in acquisition order
    pub user_steps: Vec<(usize, f64)>,
}

impl Default for OrigamiMsConfig {
    fn default() -> Self {
        OrigamiMsConfig {
            method: AcquisitionMethod::Linear,
            start_scan: 1,
            start_voltage: 4.0,
            end_voltage: 200.0,
            step_voltage: 2.0,
            scans_per_voltage: 3,
            exponential_increment: 0.01,
            exponential_percentage: 50.0,
            boltzmann_offset: 10.0,
            boltzmann_a1: 2.0,
            boltzmann_a2: 0.07,
            boltzmann_x0: 47.0,
            user_steps: Vec::new(),
        }
    }
}

impl OrigamiMsConfig {
    /// Linear acquisition starting at `start_scan`.
    pub fn linear(start_scan: usize, start_voltage: f64, end_voltage: f64, step_voltage: f64, scans_per_voltage: usize) -> Self {
        OrigamiMsConfig {
            method: AcquisitionMethod::Linear,
            start_scan,
            start_voltage,
            end_voltage,
            step_voltage,
            scans_per_voltage,
            ..Default::default()
        }
    }

    pub fn user_defined(start_scan: usize, user_steps: Vec<(usize, f64)>) -> Self {
        OrigamiMsConfig { method: AcquisitionMethod::UserDefined, start_scan, user_steps, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_scan == 0 {
            return Err(ProcessingError::invalid("start_scan", "scans are numbered from 1"));
        }
        if self.method == AcquisitionMethod::UserDefined {
            return validate_user_steps(&self.user_steps);
        }
        if !self.start_voltage.is_finite() || !self.end_voltage.is_finite() {
            return Err(ProcessingError::invalid("voltage range", "voltages must be finite"));
        }
        if self.end_voltage < self.start_voltage {
            return Err(ProcessingError::invalid(
                "end_voltage",
                format!("{} is below start_voltage {}", self.end_voltage, self.start_voltage),
            ));
        }
        if !(self.step_voltage.is_finite() && self.step_voltage > 0.0) {
            return Err(ProcessingError::invalid("step_voltage", format!("must be a positive number, got {}", self.step_voltage)));
        }
        if self.scans_per_voltage == 0 {
            return Err(ProcessingError::invalid("scans_per_voltage", "must be at least 1"));
        }
        match self.method {
            AcquisitionMethod::Exponential => {
                if !(self.exponential_increment.is_finite() && self.exponential_increment >= 0.0) {
                    return Err(ProcessingError::invalid(
                        "exponential_increment",
                        format!("must be a non-negative number, got {}", self.exponential_increment),
                    ));
                }
                if !self.exponential_percentage.is_finite() {
                    return Err(ProcessingError::invalid("exponential_percentage", "must be finite"));
                }
            }
            AcquisitionMethod::Boltzmann => {
                if self.boltzmann_offset == 0.0 || !self.boltzmann_offset.is_finite() {
                    return Err(ProcessingError::invalid("boltzmann_offset", format!("must be finite and non-zero, got {}", self.boltzmann_offset)));
                }
                if ![self.boltzmann_a1, self.boltzmann_a2, self.boltzmann_x0].iter().all(|v| v.is_finite()) {
                    return Err(ProcessingError::invalid("boltzmann parameters", "A1, A2 and x0 must be finite"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Number of voltage steps of a generated ramp: `floor((end - start) / step) + 1`.
    fn voltage_count(&self) -> Result<usize> {
        // guards against (0.3 - 0.1) / 0.1 evaluating just below 2
        let intervals = ((self.end_voltage - self.start_voltage) / self.step_voltage + 1e-9).floor();
        if !intervals.is_finite() || intervals >= MAX_VOLTAGE_STEPS as f64 {
            return Err(ProcessingError::invalid(
                "step_voltage",
                format!("ramp would exceed {} voltage steps", MAX_VOLTAGE_STEPS),
            ));
        }
        Ok(intervals as usize + 1)
    }
}

fn validate_user_steps(steps: &[(usize, f64)]) -> Result<()> {
    if steps.is_empty() {
        return Err(ProcessingError::invalid("user_steps", "the list of (scans, voltage) pairs is empty"));
    }
    for (i, &(scans, voltage)) in steps.iter().enumerate() {
        if scans == 0 {
            return Err(ProcessingError::invalid("user_steps", format!("entry {} has zero scans", i + 1)));
        }
        if !voltage.is_finite() {
            return Err(ProcessingError::invalid("user_steps", format!("entry {} has a non-finite voltage", i + 1)));
        }
    }
    Ok(())
}

/// Scans `start_scan..end_scan` (end exclusive, numbered from 1) acquired at one voltage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoltageStep {
    pub start_scan: usize,
    pub end_scan: usize,
    pub voltage: f64,
}

impl VoltageStep {
    pub fn scans(&self) -> usize {
        self.end_scan - self.start_scan
    }
}

/// Contiguous assignment of scans to collision voltages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoltageMap {
    pub steps: Vec<VoltageStep>,
}

impl VoltageMap {
    /// Lays consecutive scan counts end to end from `start_scan`.
    fn from_counts(start_scan: usize, counts: &[usize], voltages: &[f64]) -> Result<Self> {
        let mut scan = start_scan;
        let steps = counts.iter()
            .zip(voltages.iter())
            .map(|(&count, &voltage)| {
                let end_scan = scan.checked_add(count).ok_or_else(|| {
                    ProcessingError::invalid("scan counts", format!("scan index overflows at {} V", voltage))
                })?;
                let step = VoltageStep { start_scan: scan, end_scan, voltage };
                scan = end_scan;
                Ok(step)
            })
            .collect::<Result<Vec<VoltageStep>>>()?;
        Ok(VoltageMap { steps })
    }

    /// Computes the voltage map of an acquisition.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero start scan, an inverted voltage range, a non-positive step,
    /// zero scans per voltage, a zero Boltzmann offset or an invalid user-defined list, and
    /// for ramps whose step or scan counts do not fit a scan index.
    ///
    /// # Examples
    ///
    /// ```
    /// use origami::algorithm::origami_ms::{OrigamiMsConfig, VoltageMap};
    ///
    /// let config = OrigamiMsConfig::linear(1, 10.0, 50.0, 10.0, 3);
    /// let map = VoltageMap::calculate(&config).unwrap();
    /// assert_eq!(map.voltages(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    /// assert_eq!(map.total_scans(), 15);
    /// assert_eq!((map.steps[1].start_scan, map.steps[1].end_scan), (4, 7));
    /// ```
    pub fn calculate(config: &OrigamiMsConfig) -> Result<VoltageMap> {
        config.validate()?;

        let spv = config.scans_per_voltage;
        let (counts, voltages): (Vec<usize>, Vec<f64>) = match config.method {
            AcquisitionMethod::UserDefined => config.user_steps.iter().cloned().unzip(),
            AcquisitionMethod::Linear => {
                let voltages = ramp_voltages(config)?;
                (vec![spv; voltages.len()], voltages)
            }
            AcquisitionMethod::Exponential => {
                let voltages = ramp_voltages(config)?;
                let threshold = config.end_voltage * config.exponential_percentage / 100.0;
                let mut accumulator = 0.0;
                let counts = voltages.iter()
                    .map(|&voltage| {
                        if voltage < threshold {
                            return Ok(spv);
                        }
                        accumulator += config.exponential_increment;
                        scan_count((spv as f64 * f64::exp(accumulator)).round(), voltage, "exponential_increment")
                    })
                    .collect::<Result<Vec<usize>>>()?;
                (counts, voltages)
            }
            AcquisitionMethod::Boltzmann => {
                let voltages = ramp_voltages(config)?;
                let counts = voltages.iter()
                    .map(|&voltage| {
                        boltzmann_count(voltage, config)?.checked_mul(spv).ok_or_else(|| {
                            ProcessingError::invalid("boltzmann parameters", format!("scan count at {} V overflows", voltage))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                (counts, voltages)
            }
        };

        let map = VoltageMap::from_counts(config.start_scan, &counts, &voltages)?;
        debug!("{} voltage map: {} steps, {} scans", config.method, map.len(), map.total_scans());
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn voltages(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.voltage).collect()
    }

    pub fn scan_counts(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.scans()).collect()
    }

    pub fn total_scans(&self) -> usize {
        self.steps.iter().map(|s| s.scans()).sum()
    }

    /// One past the last scan of the ramp.
    pub fn end_scan(&self) -> usize {
        self.steps.last().map_or(0, |s| s.end_scan)
    }

    /// Scan boundaries paired with their voltages, two entries per step.
    ///
    /// # Examples
    ///
    /// ```
    /// use origami::algorithm::origami_ms::{OrigamiMsConfig, VoltageMap};
    ///
    /// let map = VoltageMap::calculate(&OrigamiMsConfig::linear(5, 10.0, 20.0, 10.0, 2)).unwrap();
    /// let (scans, voltages) = map.extraction_windows();
    /// assert_eq!(scans, vec![5, 7, 7, 9]);
    /// assert_eq!(voltages, vec![10.0, 10.0, 20.0, 20.0]);
    /// ```
    pub fn extraction_windows(&self) -> (Vec<usize>, Vec<f64>) {
        self.steps.iter()
            .flat_map(|s| [(s.start_scan, s.voltage), (s.end_scan, s.voltage)])
            .unzip()
    }

    /// Checks that the data holds every scan of the map.
    ///
    /// A user-defined list must also account for every scan of the data.
    fn check_available(&self, available: usize, method: AcquisitionMethod) -> Result<()> {
        let expected = self.end_scan().saturating_sub(1);
        if available < expected {
            return Err(ProcessingError::InsufficientScans { expected, available });
        }
        if available > expected && method == AcquisitionMethod::UserDefined {
            return Err(ProcessingError::UncoveredScans { expected, available });
        }
        if available > expected {
            warn!("{} trailing scan(s) after scan {} are not part of the voltage ramp", available - expected, expected);
        }
        Ok(())
    }
}

fn ramp_voltages(config: &OrigamiMsConfig) -> Result<Vec<f64>> {
    Ok(linspace(config.start_voltage, config.end_voltage, config.voltage_count()?))
}

/// Converts a rounded scan count to `usize`, rejecting values that do not fit.
fn scan_count(count: f64, voltage: f64, name: &'static str) -> Result<usize> {
    if !count.is_finite() || count < 0.0 || count >= usize::MAX as f64 {
        return Err(ProcessingError::invalid(name, format!("scan count at {} V is {}", voltage, count)));
    }
    Ok(count as usize)
}

/// Boltzmann scan multiplier `round(1 / (A2 + (A1 - A2) / (1 + exp((V - x0) / dx))))`, at least 1.
fn boltzmann_count(voltage: f64, config: &OrigamiMsConfig) -> Result<usize> {
    let (a1, a2) = (config.boltzmann_a1, config.boltzmann_a2);
    let sigmoid = a2 + (a1 - a2) / (1.0 + f64::exp((voltage - config.boltzmann_x0) / config.boltzmann_offset));
    let count = scan_count((1.0 / sigmoid).round(), voltage, "boltzmann parameters")?;
    Ok(count.max(1))
}

/// Heatmap with one column per collision voltage.
#[derive(Clone, Debug, PartialEq)]
pub struct OrigamiMsResult {
    /// Rows unchanged, `x` is the voltage axis
    pub heatmap: Heatmap,
    pub voltage_map: VoltageMap,
}

/// Sums the scans (columns) acquired at each voltage into one column.
///
/// Scans are numbered from 1, scan `s` being column `s - 1`.
///
/// # Errors
///
/// `InsufficientScans` when the heatmap has fewer columns than the ramp's last scan,
/// `UncoveredScans` when a user-defined list stops before the last column,
/// plus the configuration errors of [`VoltageMap::calculate`].
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use origami::algorithm::origami_ms::{combine_heatmap, OrigamiMsConfig};
/// use origami::data::heatmap::Heatmap;
/// use origami::error::ProcessingError;
///
/// let config = OrigamiMsConfig::linear(1, 10.0, 50.0, 10.0, 3);
///
/// let heatmap = Heatmap::from_array(DMatrix::from_element(4, 15, 1.0));
/// let result = combine_heatmap(&heatmap, &config).unwrap();
/// assert_eq!(result.heatmap.x, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
/// assert!(result.heatmap.array.iter().all(|&v| v == 3.0));
///
/// let short = Heatmap::from_array(DMatrix::from_element(4, 10, 1.0));
/// assert_eq!(
///     combine_heatmap(&short, &config).unwrap_err(),
///     ProcessingError::InsufficientScans { expected: 15, available: 10 }
/// );
/// ```
pub fn combine_heatmap(heatmap: &Heatmap, config: &OrigamiMsConfig) -> Result<OrigamiMsResult> {
    let voltage_map = VoltageMap::calculate(config)?;
    voltage_map.check_available(heatmap.ncols(), config.method)?;

    let array = DMatrix::from_fn(heatmap.nrows(), voltage_map.len(), |r, c| {
        let step = &voltage_map.steps[c];
        (step.start_scan - 1..step.end_scan - 1).map(|col| heatmap.array[(r, col)]).sum()
    });

    info!(
        "combined {} scans into {} voltages ({} method)",
        voltage_map.total_scans(),
        voltage_map.len(),
        config.method
    );
    let heatmap = Heatmap::from_parts(array, voltage_map.voltages(), heatmap.y.clone());
    Ok(OrigamiMsResult { heatmap, voltage_map })
}

/// Sums a per-scan chromatogram into one value per voltage; `x` of the result is the voltage axis.
pub fn combine_chromatogram(values: &[f64], config: &OrigamiMsConfig) -> Result<Spectrum> {
    let voltage_map = VoltageMap::calculate(config)?;
    voltage_map.check_available(values.len(), config.method)?;

    let combined = voltage_map.steps.iter()
        .map(|step| values[step.start_scan - 1..step.end_scan - 1].iter().sum())
        .collect();
    Ok(Spectrum::from_parts(voltage_map.voltages(), combined))
}

/// Parses a user-defined voltage list, one `scans voltage` pair per line.
///
/// Fields may be separated by commas, semicolons, tabs or spaces. Blank lines and
/// lines starting with `#` are skipped.
///
/// # Examples
///
/// ```
/// use origami::algorithm::origami_ms::parse_user_steps;
///
/// let steps = parse_user_steps("# scans, voltage\n3, 10\n5\t20.5\n").unwrap();
/// assert_eq!(steps, vec![(3, 10.0), (5, 20.5)]);
/// assert!(parse_user_steps("3, ten").is_err());
/// ```
pub fn parse_user_steps(text: &str) -> Result<Vec<(usize, f64)>> {
    let pattern = Regex::new(r"^\s*(\d+)\s*[,;\s]\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*$")
        .map_err(|e| ProcessingError::invalid("user_steps", e.to_string()))?;

    let mut steps = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let captures = pattern.captures(trimmed).ok_or_else(|| {
            ProcessingError::invalid("user_steps", format!("line {} is not a `scans voltage` pair: {}", number + 1, trimmed))
        })?;
        let scans = captures[1]
            .parse::<usize>()
            .map_err(|e| ProcessingError::invalid("user_steps", format!("line {}: {}", number + 1, e)))?;
        let voltage = captures[2]
            .parse::<f64>()
            .map_err(|e| ProcessingError::invalid("user_steps", format!("line {}: {}", number + 1, e)))?;
        steps.push((scans, voltage));
    }
    validate_user_steps(&steps)?;
    Ok(steps)
}
