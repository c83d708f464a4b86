use std::collections::VecDeque;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use crate::algorithm::normalize::{normalize_1d, NormalizationConfig};
use crate::algorithm::smoothing::{smooth_1d, SmoothingConfig};
use crate::algorithm::utility::{diff, max_value, mean_and_std, narrow_range, round_to};
use crate::data::peak::{Peak, PeakList, PeakRegion};
use crate::data::spectrum::Spectrum;
use crate::error::{ProcessingError, Result};

/// Configuration for the windowed local-maximum detector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDetectionConfig {
    /// Width of the suppression window in x units (default: 1.0)
    pub window: f64,
    /// Minimum intensity as a fraction of the global maximum (default: 0.1)
    pub threshold: f64,
    /// Detection fails with `TooManyPeaks` above this count (default: 1000)
    pub max_peaks: usize,
}

impl Default for PeakDetectionConfig {
    fn default() -> Self {
        PeakDetectionConfig { window: 1.0, threshold: 0.1, max_peaks: 1000 }
    }
}

impl PeakDetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.window.is_finite() && self.window >= 0.0) {
            return Err(ProcessingError::invalid("window", format!("must be a non-negative number, got {}", self.window)));
        }
        check_fraction("threshold", self.threshold)?;
        if self.max_peaks == 0 {
            return Err(ProcessingError::invalid("max_peaks", "must be at least 1"));
        }
        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ProcessingError::invalid(name, format!("must be a fraction within [0, 1], got {}", value)));
    }
    Ok(())
}

/// Finds local maxima of a spectrum in a single pass.
///
/// A point above `threshold * max` that is the highest point within `x ± window / 2` is
/// reported, and the scan resumes after `x + window / 2`. Peaks closer than `window`
/// can both be reported when their windows do not overlap.
///
/// # Errors
///
/// `InvalidParameter` for a bad configuration, `TooManyPeaks` when more than
/// `max_peaks` peaks are found.
///
/// # Examples
///
/// ```
/// use origami::algorithm::peaks::{find_peaks, PeakDetectionConfig};
/// use origami::data::spectrum::Spectrum;
///
/// let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
/// let mut y = vec![0.0; 20];
/// y[5] = 10.0;
/// y[14] = 4.0;
/// let spectrum = Spectrum::new(x, y).unwrap();
///
/// let peaks = find_peaks(&spectrum, &PeakDetectionConfig { window: 4.0, threshold: 0.1, max_peaks: 10 }).unwrap();
/// assert_eq!(peaks.x_values(), vec![5.0, 14.0]);
/// ```
pub fn find_peaks(spectrum: &Spectrum, config: &PeakDetectionConfig) -> Result<PeakList> {
    config.validate()?;
    let (x, y) = (&spectrum.x, &spectrum.y);
    let n = spectrum.len();
    let max = match max_value(y) {
        Some(max) if n > 1 && max > 0.0 => max,
        _ => return Ok(PeakList::default()),
    };
    let cutoff = max * config.threshold;
    let half = config.window / 2.0;

    // indices of the current window, intensities decreasing from the front
    let mut candidates: VecDeque<usize> = VecDeque::new();
    let mut right = 0;
    let mut i = 0;
    let mut peaks = Vec::new();

    while i < n {
        let (low, high) = (x[i] - half, x[i] + half);
        while right < n && x[right] <= high {
            while let Some(&back) = candidates.back() {
                if y[back] <= y[right] { candidates.pop_back(); } else { break; }
            }
            candidates.push_back(right);
            right += 1;
        }
        while let Some(&front) = candidates.front() {
            if x[front] < low { candidates.pop_front(); } else { break; }
        }

        let window_max = candidates.front().map_or(y[i], |&j| y[j]);
        if y[i] > cutoff && y[i] >= window_max {
            peaks.push(Peak::new(i, x[i], y[i]));
            i = right.max(i + 1);
        } else {
            i += 1;
        }
    }

    debug!("found {} peaks above {} with window {}", peaks.len(), cutoff, config.window);

    if peaks.len() > config.max_peaks {
        return Err(ProcessingError::TooManyPeaks { found: peaks.len(), limit: config.max_peaks });
    }
    Ok(PeakList::new(peaks))
}

/// Finds local maxima by comparing every point with its `window_points` neighbours on each side.
///
/// A point `i >= 1` is kept when it is above `threshold * max`, equals the maximum of
/// `y[i - window_points ..= i + window_points]` and differs from `y[i - 1]`.
/// Intended for short, high-resolution ranges such as an isotope envelope.
///
/// # Examples
///
/// ```
/// use origami::algorithm::peaks::find_peaks_exhaustive;
///
/// let x = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
/// let y = vec![0.0, 5.0, 1.0, 0.0, 2.0, 8.0, 1.0];
/// let peaks = find_peaks_exhaustive(&x, &y, 1, 0.0);
/// assert_eq!(peaks.x_values(), vec![0.1, 0.5]);
/// ```
pub fn find_peaks_exhaustive(x: &[f64], y: &[f64], window_points: usize, threshold: f64) -> PeakList {
    let n = x.len().min(y.len());
    let max = match max_value(&y[..n]) {
        Some(max) => max,
        None => return PeakList::default(),
    };
    let cutoff = max * threshold;

    let peaks = (1..n)
        .filter(|&i| y[i] > cutoff)
        .filter(|&i| {
            let start = i.saturating_sub(window_points);
            let end = (i + window_points).min(n - 1);
            let local_max = y[start..=end].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            y[i] == local_max && y[i] != y[i - 1]
        })
        .map(|i| Peak::new(i, x[i], y[i]))
        .collect();
    PeakList::new(peaks)
}

/// Settings for isotope-spacing charge inference
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeConfig {
    /// Half-width of the isotope search range in x units (default: 1.0)
    pub width: f64,
    /// Fraction of `width` searched below the peak (default: 0.6)
    pub asymmetric_ratio: f64,
    /// Neighbourhood of the isotope detector, in points (default: 10)
    pub isotope_window: usize,
    /// Isotope detection threshold as a fraction of the local maximum (default: 0.0)
    pub isotope_threshold: f64,
    /// Largest accepted population standard deviation of isotope spacings (default: 0.05)
    pub std_tolerance: f64,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        ChargeConfig {
            width: 1.0,
            asymmetric_ratio: 0.6,
            isotope_window: 10,
            isotope_threshold: 0.0,
            std_tolerance: 0.05,
        }
    }
}

impl ChargeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(ProcessingError::invalid("width", format!("must be a positive number, got {}", self.width)));
        }
        check_fraction("asymmetric_ratio", self.asymmetric_ratio)?;
        check_fraction("isotope_threshold", self.isotope_threshold)?;
        if !(self.std_tolerance.is_finite() && self.std_tolerance >= 0.0) {
            return Err(ProcessingError::invalid("std_tolerance", format!("must be a non-negative number, got {}", self.std_tolerance)));
        }
        Ok(())
    }
}

/// Outcome of [`predict_charge`]. A charge of 0 means undetermined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargeEstimate {
    pub charge: u32,
    /// Position and intensity of the highest isotope peak
    pub isotopic_apex: Option<(f64, f64)>,
    /// Population standard deviation of the isotope spacings
    pub spacing_std: Option<f64>,
    pub isotopes: PeakList,
}

impl ChargeEstimate {
    fn undetermined(isotopes: PeakList, spacing_std: Option<f64>) -> Self {
        let isotopic_apex = isotopes.apex().map(|p| (p.x, p.y));
        ChargeEstimate { charge: 0, isotopic_apex, spacing_std, isotopes }
    }
}

/// Infers the charge state of a peak from the spacing of its isotopes.
///
/// Isotopes are searched in `[peak_x - width * asymmetric_ratio, peak_x - width * asymmetric_ratio + 2 * width)`
/// with the exhaustive detector. The charge is `round(1 / mean spacing)` when at least two
/// isotopes are found and their spacing deviates by no more than `std_tolerance`, otherwise 0.
///
/// # Examples
///
/// ```
/// use origami::algorithm::peaks::{predict_charge, ChargeConfig};
/// use origami::data::spectrum::Spectrum;
///
/// // isotopes half an m/z unit apart
/// let x: Vec<f64> = (0..400).map(|i| 999.0 + i as f64 * 0.01).collect();
/// let y: Vec<f64> = x.iter().map(|&v| {
///     (0..4).map(|k| (-(v - 1000.0 - 0.5 * k as f64).powi(2) / 0.0008).exp()).sum::<f64>()
/// }).collect();
/// let spectrum = Spectrum::new(x, y).unwrap();
///
/// let config = ChargeConfig { isotope_window: 5, isotope_threshold: 0.1, ..Default::default() };
/// let estimate = predict_charge(&spectrum, 1000.0, &config).unwrap();
/// assert_eq!(estimate.charge, 2);
/// ```
pub fn predict_charge(spectrum: &Spectrum, peak_x: f64, config: &ChargeConfig) -> Result<ChargeEstimate> {
    config.validate()?;
    let start = peak_x - config.width * config.asymmetric_ratio;
    let end = start + 2.0 * config.width;
    let narrow = narrow_range(spectrum, start, end);

    let isotopes = find_peaks_exhaustive(&narrow.x, &narrow.y, config.isotope_window, config.isotope_threshold);
    let spacings = diff(&isotopes.x_values());

    let (mean, std) = match mean_and_std(&spacings) {
        Some(stats) => stats,
        None => {
            debug!("charge of {:.4} undetermined: {} isotope peak(s)", peak_x, isotopes.len());
            return Ok(ChargeEstimate::undetermined(isotopes, None));
        }
    };

    let rounded = round_to(mean, 4);
    if std > config.std_tolerance || rounded <= 0.0 {
        debug!("charge of {:.4} undetermined: spacing std {:.4} above {}", peak_x, std, config.std_tolerance);
        return Ok(ChargeEstimate::undetermined(isotopes, Some(std)));
    }

    let charge = (1.0 / rounded).round() as u32;
    debug!("predicted charge {} for {:.4}, spacing std {:.4}", charge, peak_x, std);
    let isotopic_apex = isotopes.apex().map(|p| (p.x, p.y));
    Ok(ChargeEstimate { charge, isotopic_apex, spacing_std: Some(std), isotopes })
}

/// Configuration for [`pick_peaks`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakPickingConfig {
    pub detection: PeakDetectionConfig,
    /// Detect on a Gaussian-smoothed, max-normalized copy of the signal (default: true)
    pub smooth: bool,
    /// Sigma of the pre-detection smoothing, in points (default: 1.0)
    pub smooth_sigma: f64,
    /// Infer the charge of every detected peak (default: false)
    pub predict_charge: bool,
    pub charge: ChargeConfig,
}

impl Default for PeakPickingConfig {
    fn default() -> Self {
        PeakPickingConfig {
            detection: PeakDetectionConfig::default(),
            smooth: true,
            smooth_sigma: 1.0,
            predict_charge: false,
            charge: ChargeConfig::default(),
        }
    }
}

/// Full peak picking: optional smoothing, windowed detection and charge inference.
///
/// Peak positions come from the (optionally smoothed) detection signal; reported
/// intensities are read from the input spectrum at the same index.
pub fn pick_peaks(spectrum: &Spectrum, config: &PeakPickingConfig) -> Result<PeakList> {
    let detection_signal = if config.smooth {
        let smoothed = smooth_1d(&spectrum.y, &SmoothingConfig::gaussian(config.smooth_sigma))?;
        spectrum.with_intensities(normalize_1d(&smoothed, &NormalizationConfig::default()))?
    } else {
        spectrum.clone()
    };

    let detected = find_peaks(&detection_signal, &config.detection)?;
    let mut peaks: Vec<Peak> = detected.into_iter()
        .map(|peak| Peak::new(peak.index, spectrum.x[peak.index], spectrum.y[peak.index]))
        .collect();

    if config.predict_charge {
        for peak in peaks.iter_mut() {
            let estimate = predict_charge(spectrum, peak.x, &config.charge)?;
            if estimate.charge > 0 {
                peak.charge = Some(estimate.charge);
            }
            peak.isotopic_apex = estimate.isotopic_apex;
        }
    }

    info!(
        "picked {} peaks ({} with charge)",
        peaks.len(),
        peaks.iter().filter(|p| p.charge.is_some()).count()
    );
    Ok(PeakList::new(peaks))
}

/// Contiguous runs of a chromatogram above an absolute threshold.
///
/// # Examples
///
/// ```
/// use origami::algorithm::peaks::find_chromatogram_regions;
///
/// let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
/// let y = vec![0.0, 3.0, 5.0, 0.0, 0.0, 2.0, 0.0];
/// let regions = find_chromatogram_regions(&x, &y, 1.0);
/// assert_eq!(regions.len(), 2);
/// assert_eq!((regions[0].x_start, regions[0].x_end), (2.0, 3.0));
/// assert_eq!(regions[0].apex.x, 3.0);
/// assert_eq!((regions[1].start_index, regions[1].end_index), (5, 5));
/// ```
pub fn find_chromatogram_regions(x: &[f64], y: &[f64], threshold: f64) -> Vec<PeakRegion> {
    let n = x.len().min(y.len());
    let mut regions = Vec::new();
    let mut i = 0;
    while i < n {
        if y[i] <= threshold {
            i += 1;
            continue;
        }
        let start = i;
        let mut apex = i;
        while i < n && y[i] > threshold {
            if y[i] > y[apex] {
                apex = i;
            }
            i += 1;
        }
        let end = i - 1;
        regions.push(PeakRegion {
            start_index: start,
            end_index: end,
            x_start: x[start],
            x_end: x[end],
            apex: Peak::new(apex, x[apex], y[apex]),
        });
    }
    regions
}

/// Full width at half maximum of the peak at `index`.
///
/// Half-height crossings are linearly interpolated on both sides. Returns `None`
/// when the signal does not fall below half height on either side.
///
/// # Examples
///
/// ```
/// use origami::algorithm::peaks::peak_fwhm;
///
/// let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
/// let y = vec![0.0, 5.0, 10.0, 5.0, 0.0];
/// assert_eq!(peak_fwhm(&x, &y, 2), Some(2.0));
/// ```
pub fn peak_fwhm(x: &[f64], y: &[f64], index: usize) -> Option<f64> {
    let n = x.len().min(y.len());
    if index >= n || y[index] <= 0.0 {
        return None;
    }
    let half = y[index] / 2.0;
    let crossing = |inner: usize, outer: usize| {
        let (y0, y1) = (y[inner], y[outer]);
        x[inner] + (half - y0) * (x[outer] - x[inner]) / (y1 - y0)
    };

    let mut left = index;
    while left > 0 && y[left - 1] > half {
        left -= 1;
    }
    if left == 0 {
        return None;
    }
    let mut right = index;
    while right + 1 < n && y[right + 1] > half {
        right += 1;
    }
    if right + 1 >= n {
        return None;
    }

    Some(crossing(right, right + 1) - crossing(left, left - 1))
}

/// Median FWHM over a set of peaks, usable as an automatic peak width.
pub fn estimate_peak_width(spectrum: &Spectrum, peaks: &PeakList) -> Option<f64> {
    let widths: Vec<f64> = peaks.iter()
        .filter_map(|p| peak_fwhm(&spectrum.x, &spectrum.y, p.index))
        .collect();
    if widths.is_empty() {
        return None;
    }
    let width = Data::new(widths).median();
    debug!("estimated peak width {}", width);
    Some(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isotope_train(spacings: &[f64]) -> Spectrum {
        let mut centres = vec![1000.0];
        for s in spacings {
            let last = centres[centres.len() - 1];
            centres.push(last + s);
        }
        let x: Vec<f64> = (0..5000).map(|i| 999.0 + i as f64 * 0.001).collect();
        let y: Vec<f64> = x.iter()
            .map(|&v| centres.iter().map(|c| (-(v - c).powi(2) / (2.0 * 0.004_f64.powi(2))).exp()).sum())
            .collect();
        Spectrum::new(x, y).unwrap()
    }

    fn charge_config() -> ChargeConfig {
        ChargeConfig { isotope_window: 10, isotope_threshold: 0.05, ..Default::default() }
    }

    #[test]
    fn test_isolated_spike() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.5).collect();
        let mut y = vec![0.0; 50];
        y[23] = 100.0;
        let peaks = find_peaks(&Spectrum::new(x, y).unwrap(), &PeakDetectionConfig::default()).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks.peaks[0].index, 23);
        assert_eq!(peaks.peaks[0].x, 11.5);
    }

    #[test]
    fn test_empty_and_flat_inputs() {
        let config = PeakDetectionConfig::default();
        assert!(find_peaks(&Spectrum::default(), &config).unwrap().is_empty());
        assert!(find_peaks(&Spectrum::new(vec![1.0], vec![5.0]).unwrap(), &config).unwrap().is_empty());
        let zeros = Spectrum::new(vec![1.0, 2.0, 3.0], vec![0.0; 3]).unwrap();
        assert!(find_peaks(&zeros, &config).unwrap().is_empty());
    }

    #[test]
    fn test_window_suppresses_smaller_neighbour() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![0.0, 0.0, 5.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let spectrum = Spectrum::new(x, y).unwrap();
        let wide = find_peaks(&spectrum, &PeakDetectionConfig { window: 4.0, ..Default::default() }).unwrap();
        assert_eq!(wide.x_values(), vec![4.0]);
        let narrow = find_peaks(&spectrum, &PeakDetectionConfig { window: 1.0, ..Default::default() }).unwrap();
        assert_eq!(narrow.x_values(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_too_many_peaks() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 10.0 } else { 1.0 }).collect();
        let config = PeakDetectionConfig { window: 1.0, threshold: 0.5, max_peaks: 3 };
        let result = find_peaks(&Spectrum::new(x, y).unwrap(), &config);
        assert!(matches!(result, Err(ProcessingError::TooManyPeaks { found: 10, limit: 3 })));
    }

    #[test]
    fn test_invalid_threshold() {
        let config = PeakDetectionConfig { threshold: 1.5, ..Default::default() };
        assert!(find_peaks(&Spectrum::default(), &config).is_err());
    }

    #[test]
    fn test_exhaustive_skips_plateau_repeats() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = vec![0.0, 5.0, 5.0, 0.0, 0.0];
        let peaks = find_peaks_exhaustive(&x, &y, 1, 0.0);
        assert_eq!(peaks.x_values(), vec![1.0]);
    }

    #[test]
    fn test_charge_three() {
        let spectrum = isotope_train(&[1.0 / 3.0; 6]);
        let estimate = predict_charge(&spectrum, 1000.0, &charge_config()).unwrap();
        assert_eq!(estimate.charge, 3);
        assert!(estimate.isotopes.len() >= 2);
        assert!(estimate.spacing_std.unwrap() < 0.05);
    }

    #[test]
    fn test_irregular_spacing_is_undetermined() {
        let spectrum = isotope_train(&[0.15, 0.5, 0.2, 0.45]);
        let estimate = predict_charge(&spectrum, 1000.0, &charge_config()).unwrap();
        assert_eq!(estimate.charge, 0);
        assert!(estimate.spacing_std.unwrap() > 0.05);
    }

    #[test]
    fn test_single_isotope_is_undetermined() {
        let spectrum = isotope_train(&[]);
        let estimate = predict_charge(&spectrum, 1000.0, &charge_config()).unwrap();
        assert_eq!(estimate.charge, 0);
        assert_eq!(estimate.isotopes.len(), 1);
        assert!(estimate.spacing_std.is_none());
    }

    #[test]
    fn test_pick_peaks_reports_input_intensities() {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 50.0 * (-(v - 20.0).powi(2) / 8.0).exp()).collect();
        let spectrum = Spectrum::new(x, y).unwrap();
        let config = PeakPickingConfig { detection: PeakDetectionConfig { window: 5.0, ..Default::default() }, ..Default::default() };
        let peaks = pick_peaks(&spectrum, &config).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks.peaks[0].x, 20.0);
        assert_eq!(peaks.peaks[0].y, 50.0);
    }

    #[test]
    fn test_pick_peaks_with_charge() {
        let spectrum = isotope_train(&[0.5, 0.5, 0.5]);
        let config = PeakPickingConfig {
            detection: PeakDetectionConfig { window: 4.0, threshold: 0.5, max_peaks: 10 },
            smooth: false,
            predict_charge: true,
            charge: charge_config(),
            ..Default::default()
        };
        let peaks = pick_peaks(&spectrum, &config).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks.peaks[0].charge, Some(2));
        assert!(peaks.peaks[0].isotopic_apex.is_some());
    }

    #[test]
    fn test_fwhm_without_crossing() {
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![9.0, 10.0, 9.0];
        assert_eq!(peak_fwhm(&x, &y, 1), None);
    }

    #[test]
    fn test_estimate_peak_width() {
        let x: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let y = vec![0.0, 5.0, 10.0, 5.0, 0.0, 0.0, 4.0, 0.0, 0.0];
        let spectrum = Spectrum::new(x, y).unwrap();
        let peaks = PeakList::new(vec![Peak::new(2, 2.0, 10.0), Peak::new(6, 6.0, 4.0)]);
        assert_eq!(estimate_peak_width(&spectrum, &peaks), Some(1.5));
    }
}
