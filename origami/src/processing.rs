use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::algorithm::baseline::{clip_intensity_range, subtract_baseline_1d, subtract_baseline_2d, BaselineConfig};
use crate::algorithm::linearize::{linearize, LinearizationConfig};
use crate::algorithm::normalize::{normalize_1d, normalize_2d, NormalizationConfig};
use crate::algorithm::smoothing::{smooth_1d, smooth_2d, SmoothingConfig};
use crate::algorithm::utility::crop;
use crate::data::heatmap::Heatmap;
use crate::data::spectrum::Spectrum;
use crate::error::{ProcessingError, Result};

/// Configuration for the 1D pipeline: crop, linearize, smooth, baseline, normalize
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumProcessingConfig {
    /// Whether to crop to `[crop_min, crop_max]` (default: false)
    pub crop: bool,
    pub crop_min: f64,
    pub crop_max: f64,
    /// Whether to linearize (default: true)
    pub linearize: bool,
    pub linearization: LinearizationConfig,
    /// Whether to smooth (default: false)
    pub smooth: bool,
    pub smoothing: SmoothingConfig,
    /// Whether to remove the baseline (default: false)
    pub subtract_baseline: bool,
    pub baseline: BaselineConfig,
    /// Whether to normalize (default: true)
    pub normalize: bool,
    pub normalization: NormalizationConfig,
}

impl Default for SpectrumProcessingConfig {
    fn default() -> Self {
        SpectrumProcessingConfig {
            crop: false,
            crop_min: 0.0,
            crop_max: 10000.0,
            linearize: true,
            linearization: LinearizationConfig::default(),
            smooth: false,
            smoothing: SmoothingConfig::default(),
            subtract_baseline: false,
            baseline: BaselineConfig::default(),
            normalize: true,
            normalization: NormalizationConfig::default(),
        }
    }
}

impl SpectrumProcessingConfig {
    /// Validates the settings of every enabled step.
    pub fn validate(&self) -> Result<()> {
        if self.crop && !(self.crop_min < self.crop_max) {
            return Err(ProcessingError::invalid("crop_max", format!("must be greater than crop_min {}, got {}", self.crop_min, self.crop_max)));
        }
        if self.linearize {
            self.linearization.validate()?;
        }
        if self.smooth {
            self.smoothing.validate()?;
        }
        if self.subtract_baseline {
            self.baseline.validate()?;
        }
        Ok(())
    }
}

/// Configuration for the 2D pipeline: smooth, baseline, clip, normalize
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapProcessingConfig {
    /// Whether to smooth (default: false)
    pub smooth: bool,
    pub smoothing: SmoothingConfig,
    /// Whether to remove the baseline (default: false)
    pub subtract_baseline: bool,
    pub baseline: BaselineConfig,
    /// Whether to clip to an intensity window (default: false)
    pub clip: bool,
    /// Lower clip bound as a fraction of the maximum (default: 0.0)
    pub clip_min_fraction: f64,
    /// Upper clip bound as a fraction of the maximum (default: 1.0)
    pub clip_max_fraction: f64,
    /// Whether to normalize (default: false)
    pub normalize: bool,
    pub normalization: NormalizationConfig,
}

impl Default for HeatmapProcessingConfig {
    fn default() -> Self {
        HeatmapProcessingConfig {
            smooth: false,
            smoothing: SmoothingConfig::default(),
            subtract_baseline: false,
            baseline: BaselineConfig::default(),
            clip: false,
            clip_min_fraction: 0.0,
            clip_max_fraction: 1.0,
            normalize: false,
            normalization: NormalizationConfig::default(),
        }
    }
}

impl HeatmapProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.smooth {
            self.smoothing.validate()?;
        }
        if self.subtract_baseline {
            self.baseline.validate()?;
        }
        Ok(())
    }
}

/// Runs the enabled 1D steps in order: crop, linearize, smooth, baseline, normalize.
///
/// # Examples
///
/// ```
/// use origami::data::spectrum::Spectrum;
/// use origami::processing::{process_spectrum, SpectrumProcessingConfig};
///
/// let spectrum = Spectrum::new(vec![100.0, 100.5, 101.0, 101.5], vec![2.0, 8.0, 4.0, 0.0]).unwrap();
/// let config = SpectrumProcessingConfig { linearize: false, ..Default::default() };
/// let processed = process_spectrum(&spectrum, &config).unwrap();
/// assert_eq!(processed.y, vec![0.25, 1.0, 0.5, 0.0]);
/// ```
pub fn process_spectrum(spectrum: &Spectrum, config: &SpectrumProcessingConfig) -> Result<Spectrum> {
    config.validate()?;
    let mut current = spectrum.clone();

    if config.crop {
        current = crop(&current, config.crop_min, config.crop_max)?;
        debug!("cropped to [{}, {}]: {} points", config.crop_min, config.crop_max, current.len());
    }
    if config.linearize {
        current = linearize(&current, &config.linearization)?;
    }
    if config.smooth {
        let y = smooth_1d(&current.y, &config.smoothing)?;
        current = current.with_intensities(y)?;
    }
    if config.subtract_baseline {
        let y = subtract_baseline_1d(&current.y, &config.baseline)?;
        current = current.with_intensities(y)?;
    }
    if config.normalize {
        let y = normalize_1d(&current.y, &config.normalization);
        current = current.with_intensities(y)?;
    }

    debug!("processed spectrum: {} -> {} points", spectrum.len(), current.len());
    Ok(current)
}

/// Runs the enabled 2D steps in order: smooth, baseline, clip, normalize.
pub fn process_heatmap(heatmap: &Heatmap, config: &HeatmapProcessingConfig) -> Result<Heatmap> {
    config.validate()?;
    let mut array = heatmap.array.clone();

    if config.smooth {
        array = smooth_2d(&array, &config.smoothing)?;
    }
    if config.subtract_baseline {
        array = subtract_baseline_2d(&array, &config.baseline)?;
    }
    if config.clip {
        array = clip_intensity_range(&array, config.clip_min_fraction, config.clip_max_fraction)?;
    }
    if config.normalize {
        array = normalize_2d(&array, &config.normalization);
    }

    Heatmap::new(array, heatmap.x.clone(), heatmap.y.clone())
}

/// Processes independent spectra in parallel, keeping the input order.
///
/// Each spectrum gets its own `Result`. With `num_threads` set, a dedicated pool of that
/// size is used; otherwise the global rayon pool.
///
/// # Errors
///
/// `ThreadPool` when the dedicated pool cannot be built.
pub fn process_batch(
    spectra: &[Spectrum],
    config: &SpectrumProcessingConfig,
    num_threads: Option<usize>,
) -> Result<Vec<Result<Spectrum>>> {
    let run = || -> Vec<Result<Spectrum>> {
        spectra.par_iter().map(|spectrum| process_spectrum(spectrum, config)).collect()
    };

    let results = match num_threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| ProcessingError::ThreadPool(e.to_string()))?;
            pool.install(run)
        }
        None => run(),
    };

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!("processed {} spectra, {} failed", results.len(), failed);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::baseline::BaselineMode;
    use crate::algorithm::linearize::LinearizationMode;
    use nalgebra::DMatrix;

    fn spectrum() -> Spectrum {
        let x: Vec<f64> = (0..100).map(|i| 500.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 100.0 * (-(v - 505.0).powi(2) / 0.5).exp()).collect();
        Spectrum::new(x, y).unwrap()
    }

    #[test]
    fn test_full_pipeline() {
        let config = SpectrumProcessingConfig {
            crop: true,
            crop_min: 502.0,
            crop_max: 508.0,
            linearization: LinearizationConfig { mode: LinearizationMode::LinearInterpolation, bin_size: 0.05, ..Default::default() },
            smooth: true,
            smoothing: SmoothingConfig::gaussian(1.0),
            subtract_baseline: true,
            baseline: BaselineConfig::new(BaselineMode::Relative, 0.01),
            ..Default::default()
        };
        let processed = process_spectrum(&spectrum(), &config).unwrap();
        assert!(processed.x[0] >= 502.0);
        // the axis ends at most one bin past the last cropped point
        assert!(processed.x[processed.len() - 1] <= 508.0 + 0.05 + 1e-9);
        assert!((processed.max_intensity() - 1.0).abs() < 1e-12);
        assert!(processed.y.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_invalid_step_config_fails_before_processing() {
        let config = SpectrumProcessingConfig {
            smooth: true,
            smoothing: SmoothingConfig::savitzky_golay(4, 2),
            ..Default::default()
        };
        assert!(matches!(process_spectrum(&spectrum(), &config), Err(ProcessingError::InvalidParameter { .. })));
    }

    #[test]
    fn test_heatmap_pipeline() {
        let array = DMatrix::from_row_slice(3, 2, &[0.8, 10.0, 5.0, 20.0, 2.0, 0.5]);
        let heatmap = Heatmap::from_array(array);
        let config = HeatmapProcessingConfig {
            subtract_baseline: true,
            baseline: BaselineConfig::new(BaselineMode::Threshold, 1.0),
            normalize: true,
            ..Default::default()
        };
        let processed = process_heatmap(&heatmap, &config).unwrap();
        assert_eq!(processed.array, DMatrix::from_row_slice(3, 2, &[0.0, 0.5, 1.0, 1.0, 0.4, 0.0]));
        assert_eq!(processed.x, heatmap.x);
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_errors() {
        let good = spectrum();
        let bad = Spectrum::new(vec![1.0], vec![1.0]).unwrap();
        let spectra = vec![good.clone(), bad, good];
        let config = SpectrumProcessingConfig::default();
        let results = process_batch(&spectra, &config, Some(2)).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[0].as_ref().unwrap(), results[2].as_ref().unwrap());
    }
}
