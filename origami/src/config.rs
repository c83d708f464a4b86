//! TOML configuration for the full processing chain.
//!
//! Every section and every key is optional; missing values fall back to defaults.
//!
//! ```toml
//! [ms]
//! crop = true
//! crop_min = 500.0
//! crop_max = 5000.0
//!
//! [ms.linearization]
//! mode = "Linear interpolation"
//! bin_size = 0.05
//!
//! [heatmap]
//! smooth = true
//!
//! [heatmap.smoothing]
//! mode = "Savitzky-Golay"
//! window = 7
//! polynomial = 3
//!
//! [origami]
//! method = "Linear"
//! start_scan = 5
//! scans_per_voltage = 3
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::downsample::DownsampleConfig;
use crate::algorithm::origami_ms::{AcquisitionMethod, OrigamiMsConfig};
use crate::algorithm::peaks::PeakPickingConfig;
use crate::error::ProcessingError;
use crate::processing::{HeatmapProcessingConfig, SpectrumProcessingConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ProcessingError),
}

/// Root of a configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 1D spectrum and chromatogram processing
    pub ms: SpectrumProcessingConfig,
    /// 2D heatmap processing
    pub heatmap: HeatmapProcessingConfig,
    pub peaks: PeakPickingConfig,
    pub downsample: DownsampleConfig,
    pub origami: OrigamiMsConfig,
}

impl ProcessingConfig {
    /// Loads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProcessingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Checks every section. The ORIGAMI-MS section is only checked for
    /// methods that do not need a user list, as that list usually comes from a separate file.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        self.ms.validate()?;
        self.heatmap.validate()?;
        self.peaks.detection.validate()?;
        if self.peaks.predict_charge {
            self.peaks.charge.validate()?;
        }
        self.downsample.validate()?;
        if !self.origami.user_steps.is_empty() || self.origami.method != AcquisitionMethod::UserDefined {
            self.origami.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::linearize::LinearizationMode;
    use crate::algorithm::smoothing::SmoothingMode;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [ms]
            crop = true
            crop_min = 500.0
            crop_max = 5000.0

            [ms.linearization]
            mode = "Linear interpolation"
            bin_size = 0.05

            [heatmap]
            smooth = true

            [heatmap.smoothing]
            mode = "Savitzky-Golay"
            window = 7
            polynomial = 3

            [origami]
            method = "Linear"
            start_scan = 5
        "#;

        let config = ProcessingConfig::from_toml_str(toml).unwrap();
        assert!(config.ms.crop);
        assert_eq!(config.ms.linearization.mode, LinearizationMode::LinearInterpolation);
        assert_eq!(config.ms.linearization.bin_size, 0.05);
        assert_eq!(config.heatmap.smoothing.mode, SmoothingMode::SavitzkyGolay);
        assert_eq!(config.heatmap.smoothing.window, 7);
        assert_eq!(config.origami.method, AcquisitionMethod::Linear);
        assert_eq!(config.origami.start_scan, 5);
        assert_eq!(config.origami.scans_per_voltage, 3);
    }

    #[test]
    fn test_empty_config() {
        let config = ProcessingConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProcessingConfig::default());
    }

    #[test]
    fn test_user_steps_in_config() {
        let toml = r#"
            [origami]
            method = "User-defined"
            user_steps = [[3, 10.0], [5, 20.0]]
        "#;
        let config = ProcessingConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.origami.user_steps, vec![(3, 10.0), (5, 20.0)]);
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let toml = r#"
            [ms.smoothing]
            mode = "Wavelet"
        "#;
        assert!(matches!(ProcessingConfig::from_toml_str(toml), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let toml = r#"
            [ms]
            smooth = true

            [ms.smoothing]
            mode = "Savitzky-Golay"
            window = 4
        "#;
        assert!(matches!(
            ProcessingConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(ProcessingError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_default_config_survives_a_toml_round_trip() {
        let text = ProcessingConfig::default().to_toml_string().unwrap();
        assert_eq!(ProcessingConfig::from_toml_str(&text).unwrap(), ProcessingConfig::default());
    }
}
