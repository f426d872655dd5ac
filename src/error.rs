//! Error types for the colormatch_calibration library

use crate::ports::{IlluminationError, SensorError, StorageError};
use thiserror::Error;

/// Result type alias for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Error types for calibration, correction and auto-calibration operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Operation attempted before `initialize()` completed
    #[error("Calibration manager not initialized - call initialize() first")]
    NotInitialized,

    /// Color name is not one of the six reference colors
    #[error("Invalid color name: {name} (supported: black, white, red, green, blue, yellow)")]
    UnknownColor { name: String },

    /// All three raw channels were zero
    #[error("Invalid sensor reading: all channels are zero (sensor may be disconnected or covered)")]
    ZeroReading,

    /// Quality score outside [0, 1]
    #[error("Quality parameter out of range [0.0, 1.0]: {quality}")]
    InvalidQuality { quality: f32 },

    /// Solver was handed no points
    #[error("No calibration points provided")]
    EmptyPointSet,

    /// A point with an all-zero raw reading reached the solver
    #[error("Invalid sensor reading (all zeros) for target {target:?}")]
    InvalidPoint { target: [u8; 3] },

    /// A point at or above the solver's saturation ceiling
    #[error("Sensor reading saturated for target {target:?}")]
    SaturatedPoint { target: [u8; 3] },

    /// Two points share the same target color
    #[error("Duplicate calibration point for target {target:?}")]
    DuplicateTarget { target: [u8; 3] },

    /// Target colors do not span enough of the RGB cube
    #[error("Insufficient {channel} channel diversity (range: {range}, minimum: {minimum})")]
    InsufficientTargetDiversity {
        channel: &'static str,
        range: u8,
        minimum: u8,
    },

    /// Raw readings do not span enough of the sensor range
    #[error("Insufficient sensor reading diversity - XYZ ranges: X({x}) Y({y}) Z({z}), minimum: {minimum}")]
    InsufficientSensorDiversity { x: u16, y: u16, z: u16, minimum: u16 },

    /// Normal-equation matrix or fitted matrix is singular
    #[error("Matrix is singular ({context}, determinant = {determinant:e})")]
    SingularMatrix {
        context: &'static str,
        determinant: f64,
    },

    /// Fitted matrix exceeds the condition-number limit
    #[error("Matrix is ill-conditioned (condition number {condition_number:.2}, limit {limit:.0})")]
    IllConditioned { condition_number: f64, limit: f64 },

    /// Auto-calibration operation issued while no sequence is running
    #[error("Auto-calibration is not in progress")]
    AutoCalibrationInactive,

    /// Skip requested on a mandatory step
    #[error("{color} cannot be skipped")]
    StepNotSkippable { color: &'static str },

    /// A capture stage failed; the sequence stays on the same step
    #[error("{stage} failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },

    /// Sensor collaborator failure
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Illumination collaborator failure
    #[error("Illumination error: {0}")]
    Illumination(#[from] IlluminationError),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CalibrationError {
    /// Check if this error leaves the device usable on a lower correction tier
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CalibrationError::InsufficientTargetDiversity { .. }
                | CalibrationError::InsufficientSensorDiversity { .. }
                | CalibrationError::SingularMatrix { .. }
                | CalibrationError::IllConditioned { .. }
                | CalibrationError::DuplicateTarget { .. }
                | CalibrationError::SaturatedPoint { .. }
                | CalibrationError::StageFailed { .. }
                | CalibrationError::Sensor(_)
                | CalibrationError::Illumination(_)
                | CalibrationError::Storage(_)
        )
    }

    /// Check if this is a solver-side failure (matrix stays invalid, points are kept)
    pub fn is_solver_error(&self) -> bool {
        matches!(
            self,
            CalibrationError::EmptyPointSet
                | CalibrationError::InvalidPoint { .. }
                | CalibrationError::SaturatedPoint { .. }
                | CalibrationError::DuplicateTarget { .. }
                | CalibrationError::InsufficientTargetDiversity { .. }
                | CalibrationError::InsufficientSensorDiversity { .. }
                | CalibrationError::SingularMatrix { .. }
                | CalibrationError::IllConditioned { .. }
        )
    }

    /// Get operator-facing error description
    pub fn user_message(&self) -> String {
        match self {
            CalibrationError::NotInitialized => {
                "Calibration is still starting up. Please wait and try again.".to_string()
            }
            CalibrationError::UnknownColor { name } => {
                format!("'{}' is not a calibration color. Use black, white, red, green, blue or yellow.", name)
            }
            CalibrationError::ZeroReading => {
                "The sensor returned no signal. Check that it is connected and uncovered.".to_string()
            }
            CalibrationError::InsufficientTargetDiversity { .. }
            | CalibrationError::InsufficientSensorDiversity { .. }
            | CalibrationError::SingularMatrix { .. }
            | CalibrationError::IllConditioned { .. } => {
                "Calibration samples are too similar. Include strong red, green and blue samples alongside black and white.".to_string()
            }
            CalibrationError::StepNotSkippable { color } => {
                format!("{} is required and cannot be skipped.", color)
            }
            CalibrationError::StageFailed { stage, .. } => {
                format!("{} failed. Reposition the sample and try again.", stage)
            }
            _ => "Calibration operation failed. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_errors_are_recoverable() {
        let err = CalibrationError::IllConditioned {
            condition_number: 5000.0,
            limit: 1000.0,
        };
        assert!(err.is_recoverable());
        assert!(err.is_solver_error());
        assert!(err.to_string().contains("ill-conditioned"));
    }

    #[test]
    fn test_input_errors_are_not_recoverable() {
        assert!(!CalibrationError::ZeroReading.is_recoverable());
        assert!(!CalibrationError::NotInitialized.is_recoverable());
        assert!(!CalibrationError::InvalidQuality { quality: 1.5 }.is_solver_error());
    }

    #[test]
    fn test_collaborator_errors_convert() {
        let err: CalibrationError = SensorError::ReadFailed.into();
        assert!(matches!(err, CalibrationError::Sensor(SensorError::ReadFailed)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_user_message_names_color() {
        let err = CalibrationError::UnknownColor {
            name: "magenta".to_string(),
        };
        assert!(err.user_message().contains("magenta"));

        let err = CalibrationError::StepNotSkippable { color: "Vivid White" };
        assert!(err.user_message().starts_with("Vivid White"));
    }
}
