//! Color calibration and correction module
//!
//! This module fits a 3×3 color correction matrix from reference-color
//! samples, applies it through the compensation pipelines, and drives the
//! guided calibration sequence.

pub mod auto;
pub mod manager;
pub mod matrix;
pub mod point;
pub mod solver;

pub use auto::{AutoCalibrationState, AutoCalibrationStatus, BlackStage, CaptureStep};
pub use manager::{CalibrationManager, CalibrationStatus, CorrectionTier};
pub use matrix::{ColorCorrectionMatrix, CompensationLevel, MatrixOutput, ReferenceSamples};
pub use point::{CalibrationColor, CalibrationPoint, DarkOffsetPoint, PointSet, RawXyz};
pub use solver::MatrixSolver;
