//! Configuration structures for the calibration engine.
//!
//! This module defines the tunable thresholds of the matrix solver, the
//! runtime correction tiers and the guided auto-calibration sequence.
//!
//! # Configuration Loading
//!
//! Configuration can be loaded from JSON files or constructed programmatically:
//!
//! ```no_run
//! use colormatch_calibration::CalibrationConfig;
//! use std::path::Path;
//!
//! // Load from file
//! let config = CalibrationConfig::from_json_file(Path::new("calibration.json"))?;
//!
//! // Or use defaults
//! let config = CalibrationConfig::default();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Sections
//!
//! - [`SolverConfig`]: diversity and numerical-stability limits for fitting
//! - [`CorrectionConfig`]: when the matrix tier engages, pipeline constants
//! - [`AutoCalibrationConfig`]: illumination safety during guided calibration

use serde::{Deserialize, Serialize};

/// Complete calibration engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CalibrationConfig {
    /// Matrix solver configuration
    #[serde(default)]
    pub solver: SolverConfig,

    /// Runtime correction configuration
    #[serde(default)]
    pub correction: CorrectionConfig,

    /// Auto-calibration configuration
    #[serde(default)]
    pub auto_calibration: AutoCalibrationConfig,
}

/// Least-squares solver limits.
///
/// A fitted matrix is accepted only if `|determinant| >= min_determinant`
/// and `condition_number <= max_condition_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Minimum min-max span of each target RGB channel (0-255)
    pub min_target_range: u8,

    /// Minimum min-max span of each raw sensor channel
    pub min_sensor_range: u16,

    /// Added to the diagonal of AᵗA before inversion
    pub regularization: f64,

    /// Smallest determinant magnitude treated as invertible
    pub min_determinant: f64,

    /// Largest acceptable condition number of the fitted matrix
    pub max_condition_number: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            min_target_range: 50,
            min_sensor_range: 1000,
            regularization: 1e-6,
            min_determinant: 1e-6,
            max_condition_number: 1000.0,
        }
    }
}

/// Runtime correction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Distinct-color points required before the matrix is fitted or used
    pub min_matrix_points: usize,

    /// Full-scale divisor of the Professional pipeline after flare removal
    pub professional_full_scale: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            min_matrix_points: 5,
            professional_full_scale: 4095.0,
        }
    }
}

/// Guided calibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCalibrationConfig {
    /// Brightness restored when the sequence ends with illumination off
    pub default_brightness: u8,
}

impl Default for AutoCalibrationConfig {
    fn default() -> Self {
        Self {
            default_brightness: 128,
        }
    }
}

impl CalibrationConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_default_thresholds() {
        let config = CalibrationConfig::default();
        assert_eq!(config.solver.min_target_range, 50);
        assert_eq!(config.solver.min_sensor_range, 1000);
        assert_eq!(config.correction.min_matrix_points, 5);
        assert_eq!(config.auto_calibration.default_brightness, 128);
        assert!(config.solver.max_condition_number > 1.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "auto_calibration": { "default_brightness": 200 } }"#;
        let config: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.auto_calibration.default_brightness, 200);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "calibration_config_test_{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let mut config = CalibrationConfig::default();
        config.solver.max_condition_number = 250.0;
        config.to_json_file(&path).unwrap();

        let loaded = CalibrationConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_file(&path).ok();
    }
}
